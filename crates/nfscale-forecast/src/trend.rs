//! Linear trend and trailing moving average forecasters.

use crate::error::{ForecastError, ForecastResult};
use crate::forecaster::{Forecaster, check_finite};
use crate::linalg::least_squares;

/// Least-squares line through `(t, series[t])`, extrapolated.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrendForecaster;

impl Forecaster for LinearTrendForecaster {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn predict(&self, series: &[f64], horizon: usize) -> ForecastResult<Vec<f64>> {
        check_finite(series)?;
        if series.len() < 3 {
            return Err(ForecastError::InsufficientData {
                needed: 3,
                got: series.len(),
            });
        }

        let rows: Vec<Vec<f64>> = (0..series.len()).map(|t| vec![1.0, t as f64]).collect();
        let beta = least_squares(&rows, series)?;
        let (intercept, slope) = (beta[0], beta[1]);

        let n = series.len();
        Ok((0..horizon)
            .map(|h| intercept + slope * (n + h) as f64)
            .collect())
    }
}

/// Mean of the last `window` observations, held flat.
#[derive(Debug, Clone)]
pub struct MovingAverageForecaster {
    window: usize,
}

impl MovingAverageForecaster {
    pub fn new(window: usize) -> ForecastResult<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidModel(
                "moving average window must be at least 1".to_string(),
            ));
        }
        Ok(Self { window })
    }
}

impl Forecaster for MovingAverageForecaster {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn predict(&self, series: &[f64], horizon: usize) -> ForecastResult<Vec<f64>> {
        check_finite(series)?;
        if series.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        let tail = &series[series.len().saturating_sub(self.window)..];
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        Ok(vec![mean; horizon])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_extrapolates_slope() {
        let series = vec![10.0, 20.0, 30.0, 40.0];
        let out = LinearTrendForecaster.predict(&series, 2).unwrap();
        assert!((out[0] - 50.0).abs() < 1e-9);
        assert!((out[1] - 60.0).abs() < 1e-9);
    }

    #[test]
    fn moving_average_uses_trailing_window() {
        let f = MovingAverageForecaster::new(2).unwrap();
        let out = f.predict(&[100.0, 10.0, 30.0], 3).unwrap();
        assert_eq!(out, vec![20.0, 20.0, 20.0]);
    }

    #[test]
    fn moving_average_window_larger_than_series() {
        let f = MovingAverageForecaster::new(10).unwrap();
        assert_eq!(f.predict(&[2.0, 4.0], 1).unwrap(), vec![3.0]);
    }

    #[test]
    fn zero_window_rejected() {
        assert!(MovingAverageForecaster::new(0).is_err());
    }
}
