//! Ordinary least squares via the normal equations.

use crate::error::{ForecastError, ForecastResult};

/// Relative pivot size below which a matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-10;

/// Solve `min ||X b - y||²` for `b`.
///
/// `rows` are the rows of `X`; every row must have the same length.
pub(crate) fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> ForecastResult<Vec<f64>> {
    let k = rows.first().map_or(0, Vec::len);
    if k == 0 || rows.len() < k {
        return Err(ForecastError::InsufficientData {
            needed: k.max(1),
            got: rows.len(),
        });
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    solve(xtx, xty)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> ForecastResult<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|r| r.iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= SINGULAR_EPS * scale {
            return Err(ForecastError::SingularMatrix);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::SingularMatrix);
    }
    Ok(x)
}
