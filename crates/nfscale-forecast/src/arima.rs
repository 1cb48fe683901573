//! ARIMA(p, d, q) forecaster.
//!
//! The model is refit from scratch on every call; series are short (one
//! monitoring window) so the cost stays bounded.
//!
//! # Fitting
//!
//! ```text
//! z      = d-th difference of the series
//! z[t]   = c + Σ φ[i]·z[t-i] + Σ θ[j]·e[t-j] + e[t]
//!
//! q == 0: conditional least squares on lagged z
//! q  > 0: Hannan–Rissanen
//!         1. long AR fit → residual estimates ê
//!         2. regress z on lagged z and lagged ê
//!         3. re-filter residuals with the fitted model and re-regress
//!            until the coefficients settle or the residuals vanish
//! ```
//!
//! Forecasts run the recursion forward with future shocks set to zero and
//! are then integrated back `d` times.

use nfscale_core::ArimaOrder;
use tracing::debug;

use crate::error::{ForecastError, ForecastResult};
use crate::forecaster::{Forecaster, check_finite};
use crate::linalg::least_squares;

/// Upper bound on each of `p`, `d`, `q`.
pub const MAX_ORDER: usize = 10;

const MAX_REFINEMENTS: usize = 50;
const REFINE_TOLERANCE: f64 = 1e-6;

/// Variance below this (relative to the series scale) means the
/// differenced series is constant.
const FLAT_EPS: f64 = 1e-12;

/// Residual variance below this fraction of the series variance means the
/// model already reproduces the series; refining further only shrinks the
/// lagged-residual columns toward singularity.
const EXACT_FIT_EPS: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct ArimaForecaster {
    order: ArimaOrder,
}

/// Fitted ARMA part of the model on the differenced series.
#[derive(Debug, Clone, PartialEq)]
struct ArmaFit {
    intercept: f64,
    phi: Vec<f64>,
    theta: Vec<f64>,
    /// In-sample residuals, aligned with the differenced series.
    residuals: Vec<f64>,
}

impl ArimaForecaster {
    pub fn new(order: ArimaOrder) -> ForecastResult<Self> {
        let ArimaOrder { p, d, q } = order;
        if p > MAX_ORDER || d > MAX_ORDER || q > MAX_ORDER {
            return Err(ForecastError::InvalidModel(format!(
                "ARIMA order ({p}, {d}, {q}) exceeds {MAX_ORDER}"
            )));
        }
        Ok(Self { order })
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Fewest observations that can produce a fit for this order.
    pub fn min_observations(&self) -> usize {
        let ArimaOrder { p, d, q } = self.order;
        if q == 0 {
            // p + 1 coefficients need at least p + 2 rows after p lags.
            d + 2 * p + 2
        } else {
            let k = long_ar_order(p, q);
            d + (k + p.max(q) + p + q + 2).max(2 * k + 2)
        }
    }

    fn fit(&self, z: &[f64]) -> ForecastResult<ArmaFit> {
        let ArimaOrder { p, q, .. } = self.order;
        if q == 0 {
            return fit_ar(z, p);
        }

        let k = long_ar_order(p, q);
        let long = fit_ar(z, k)?;
        let start = k + p.max(q);
        let mut fit = regress_arma(z, &long.residuals, p, q, start)?;

        let lag = p.max(q);
        let (_, z_variance) = mean_variance(z);
        for round in 0..MAX_REFINEMENTS {
            let residuals = filter_residuals(z, &fit)?;
            let sigma2 = residual_variance(&residuals, lag);
            if sigma2 <= EXACT_FIT_EPS * z_variance {
                debug!(round, sigma2, "residuals vanished, keeping current fit");
                fit.residuals = residuals;
                return Ok(fit);
            }
            let next = match regress_arma(z, &residuals, p, q, lag) {
                Ok(next) => next,
                Err(ForecastError::SingularMatrix) => {
                    debug!(round, sigma2, "lagged residuals collinear, keeping current fit");
                    fit.residuals = residuals;
                    return Ok(fit);
                }
                Err(e) => return Err(e),
            };
            let delta = coefficient_delta(&fit, &next);
            let scale = 1.0 + coefficient_norm(&next);
            fit = next;
            if delta < REFINE_TOLERANCE * scale {
                fit.residuals = filter_residuals(z, &fit)?;
                return Ok(fit);
            }
        }

        Err(ForecastError::NonConvergence(MAX_REFINEMENTS))
    }
}

impl Forecaster for ArimaForecaster {
    fn name(&self) -> &'static str {
        "arima"
    }

    fn predict(&self, series: &[f64], horizon: usize) -> ForecastResult<Vec<f64>> {
        check_finite(series)?;
        if horizon == 0 {
            return Ok(Vec::new());
        }

        let needed = self.min_observations();
        if series.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        let levels = difference(series, self.order.d);
        let z = &levels[self.order.d];

        let (mean, variance) = mean_variance(z);

        let forecast = if variance <= FLAT_EPS * (1.0 + mean * mean) {
            debug!(mean, "differenced series is flat, continuing the mean");
            vec![mean; horizon]
        } else {
            let fit = self.fit(z)?;
            let sigma2 = residual_variance(&fit.residuals, self.order.p.max(self.order.q));
            if !sigma2.is_finite() {
                return Err(ForecastError::DegenerateVariance(sigma2));
            }
            debug!(
                intercept = fit.intercept,
                phi = ?fit.phi,
                theta = ?fit.theta,
                sigma2,
                "arima fit"
            );
            forecast_arma(z, &fit, horizon)
        };

        let out = integrate(&levels, forecast);
        if let Some(idx) = out.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite(idx));
        }
        Ok(out)
    }
}

/// Long-AR order used for the first Hannan–Rissanen stage.
fn long_ar_order(p: usize, q: usize) -> usize {
    p + q + 1
}

/// `levels[0]` is the series, `levels[i]` its i-th difference.
fn difference(series: &[f64], d: usize) -> Vec<Vec<f64>> {
    let mut levels = Vec::with_capacity(d + 1);
    levels.push(series.to_vec());
    for i in 0..d {
        let next: Vec<f64> = levels[i].windows(2).map(|w| w[1] - w[0]).collect();
        levels.push(next);
    }
    levels
}

/// Undo `difference` on a forecast of the top level.
fn integrate(levels: &[Vec<f64>], mut forecast: Vec<f64>) -> Vec<f64> {
    for level in levels[..levels.len() - 1].iter().rev() {
        let mut last = level.last().copied().unwrap_or(0.0);
        for v in &mut forecast {
            last += *v;
            *v = last;
        }
    }
    forecast
}

/// Conditional least-squares AR(p) fit with intercept.
fn fit_ar(z: &[f64], p: usize) -> ForecastResult<ArmaFit> {
    let cols = p + 1;
    let rows: Vec<Vec<f64>> = (p..z.len())
        .map(|t| {
            let mut row = Vec::with_capacity(cols);
            row.push(1.0);
            row.extend((1..=p).map(|i| z[t - i]));
            row
        })
        .collect();
    if rows.len() <= cols {
        return Err(ForecastError::InsufficientData {
            needed: p + cols + 1,
            got: z.len(),
        });
    }
    let y = &z[p..];
    let beta = least_squares(&rows, y)?;

    let mut fit = ArmaFit {
        intercept: beta[0],
        phi: beta[1..].to_vec(),
        theta: Vec::new(),
        residuals: vec![0.0; z.len()],
    };
    for t in p..z.len() {
        fit.residuals[t] = z[t] - one_step(z, &fit.residuals, &fit, t);
    }
    Ok(fit)
}

/// Regress `z[t]` on lagged `z` and lagged `residuals` for `t >= start`.
fn regress_arma(
    z: &[f64],
    residuals: &[f64],
    p: usize,
    q: usize,
    start: usize,
) -> ForecastResult<ArmaFit> {
    let cols = 1 + p + q;
    let rows: Vec<Vec<f64>> = (start..z.len())
        .map(|t| {
            let mut row = Vec::with_capacity(cols);
            row.push(1.0);
            row.extend((1..=p).map(|i| z[t - i]));
            row.extend((1..=q).map(|j| residuals[t - j]));
            row
        })
        .collect();
    if rows.len() <= cols {
        return Err(ForecastError::InsufficientData {
            needed: start + cols + 1,
            got: z.len(),
        });
    }
    let beta = least_squares(&rows, &z[start..])?;

    Ok(ArmaFit {
        intercept: beta[0],
        phi: beta[1..=p].to_vec(),
        theta: beta[p + 1..].to_vec(),
        residuals: residuals.to_vec(),
    })
}

/// Recompute residuals by running the fitted recursion over `z`.
///
/// Pre-sample shocks are zero.
fn filter_residuals(z: &[f64], fit: &ArmaFit) -> ForecastResult<Vec<f64>> {
    let lag = fit.phi.len();
    let mut residuals = vec![0.0; z.len()];
    for t in lag..z.len() {
        let e = z[t] - one_step(z, &residuals, fit, t);
        if !e.is_finite() {
            return Err(ForecastError::NonConvergence(0));
        }
        residuals[t] = e;
    }
    Ok(residuals)
}

/// Conditional expectation of `history[t]` given everything before `t`.
fn one_step(history: &[f64], shocks: &[f64], fit: &ArmaFit, t: usize) -> f64 {
    let ar: f64 = fit
        .phi
        .iter()
        .enumerate()
        .map(|(i, phi)| phi * history[t - 1 - i])
        .sum();
    let ma: f64 = fit
        .theta
        .iter()
        .enumerate()
        .filter(|(j, _)| t > *j)
        .map(|(j, theta)| theta * shocks[t - 1 - j])
        .sum();
    fit.intercept + ar + ma
}

fn forecast_arma(z: &[f64], fit: &ArmaFit, horizon: usize) -> Vec<f64> {
    let mut history = z.to_vec();
    let mut shocks = fit.residuals.clone();
    let mut out = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let t = history.len();
        let next = one_step(&history, &shocks, fit, t);
        history.push(next);
        shocks.push(0.0);
        out.push(next);
    }
    out
}

fn mean_variance(z: &[f64]) -> (f64, f64) {
    let mean = z.iter().sum::<f64>() / z.len() as f64;
    let variance = z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / z.len() as f64;
    (mean, variance)
}

fn residual_variance(residuals: &[f64], skip: usize) -> f64 {
    let used = &residuals[skip.min(residuals.len())..];
    if used.is_empty() {
        return f64::NAN;
    }
    used.iter().map(|e| e * e).sum::<f64>() / used.len() as f64
}

fn coefficients(fit: &ArmaFit) -> impl Iterator<Item = f64> + '_ {
    std::iter::once(fit.intercept)
        .chain(fit.phi.iter().copied())
        .chain(fit.theta.iter().copied())
}

fn coefficient_delta(a: &ArmaFit, b: &ArmaFit) -> f64 {
    coefficients(a)
        .zip(coefficients(b))
        .fold(0.0, |m, (x, y)| m.max((x - y).abs()))
}

fn coefficient_norm(fit: &ArmaFit) -> f64 {
    coefficients(fit).fold(0.0, |m, v| m.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arima(p: usize, d: usize, q: usize) -> ArimaForecaster {
        ArimaForecaster::new(ArimaOrder { p, d, q }).unwrap()
    }

    /// Deterministic AR(1) path: x[t] = 10 + 0.6·x[t-1] + small wobble.
    fn ar1_series(n: usize) -> Vec<f64> {
        let mut x = vec![40.0];
        for t in 1..n {
            let wobble = if t % 2 == 0 { 1.5 } else { -1.0 };
            x.push(10.0 + 0.6 * x[t - 1] + wobble);
        }
        x
    }

    #[test]
    fn returns_exactly_horizon_values() {
        let f = arima(1, 0, 0);
        let out = f.predict(&ar1_series(10), 10).unwrap();
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn ar1_forecast_reverts_toward_mean() {
        let series = ar1_series(30);
        let out = arima(1, 0, 0).predict(&series, 20).unwrap();
        // Long-run mean of the generating process is ~25.6.
        let last = *out.last().unwrap();
        assert!((last - 25.6).abs() < 3.0, "last = {last}");
    }

    #[test]
    fn exact_ar1_process_is_recovered() {
        // x[t] = 5 + 0.5·x[t-1], started away from its fixed point of 10.
        let mut x = vec![50.0];
        for t in 1..12 {
            x.push(5.0 + 0.5 * x[t - 1]);
        }
        // Exact recursion means exact forecasts.
        let out = arima(1, 0, 0).predict(&x, 3).unwrap();
        let mut expected = *x.last().unwrap();
        for v in out {
            expected = 5.0 + 0.5 * expected;
            assert!((v - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn constant_series_continues_flat() {
        let series = vec![42.0; 10];
        let out = arima(1, 0, 0).predict(&series, 5).unwrap();
        assert!(out.iter().all(|v| (v - 42.0).abs() < 1e-9));
    }

    #[test]
    fn differenced_ramp_continues_the_ramp() {
        let series: Vec<f64> = (0..10).map(|t| 10.0 + 5.0 * t as f64).collect();
        let out = arima(1, 1, 0).predict(&series, 3).unwrap();
        assert!((out[0] - 60.0).abs() < 1e-9);
        assert!((out[2] - 70.0).abs() < 1e-9);
    }

    #[test]
    fn zero_order_forecasts_the_mean() {
        let series = vec![10.0, 20.0, 30.0, 40.0];
        let out = arima(0, 0, 0).predict(&series, 2).unwrap();
        assert!((out[0] - 25.0).abs() < 1e-9);
        assert!((out[1] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn arma_with_moving_average_term_fits() {
        let series: Vec<f64> = (0..40)
            .map(|t| 50.0 + 10.0 * ((t as f64) * 0.7).sin() + 3.0 * ((t as f64) * 2.3).cos())
            .collect();
        let values = arima(1, 0, 1).predict(&series, 10).unwrap();
        assert_eq!(values.len(), 10);
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn residual_variance_skips_presample() {
        assert_eq!(residual_variance(&[9.0, 1.0, -1.0], 1), 1.0);
        assert!(residual_variance(&[1.0], 4).is_nan());
    }

    #[test]
    fn collinear_lags_are_singular() {
        // A straight ramp makes z[t-1] and z[t-2] collinear with the intercept.
        let series: Vec<f64> = (0..12).map(|t| t as f64).collect();
        assert_eq!(
            arima(2, 0, 0).predict(&series, 5),
            Err(ForecastError::SingularMatrix)
        );
    }

    #[test]
    fn short_series_is_insufficient() {
        let err = arima(5, 1, 0).predict(&[1.0, 2.0, 3.0], 5).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { got: 3, .. }));
    }

    #[test]
    fn nan_in_series_is_rejected() {
        let mut series = ar1_series(10);
        series[4] = f64::NAN;
        assert_eq!(
            arima(1, 0, 0).predict(&series, 5),
            Err(ForecastError::NonFinite(4))
        );
    }

    #[test]
    fn oversized_order_is_rejected() {
        assert!(matches!(
            ArimaForecaster::new(ArimaOrder { p: 11, d: 0, q: 0 }),
            Err(ForecastError::InvalidModel(_))
        ));
    }

    #[test]
    fn difference_and_integrate_round_trip() {
        let series = vec![1.0, 4.0, 9.0, 16.0];
        let levels = difference(&series, 2);
        assert_eq!(levels[1], vec![3.0, 5.0, 7.0]);
        assert_eq!(levels[2], vec![2.0, 2.0]);
        // Constant second difference of 2 continues the squares.
        assert_eq!(integrate(&levels, vec![2.0, 2.0]), vec![25.0, 36.0]);
    }
}
