//! Holt's linear exponential smoothing.

use crate::error::{ForecastError, ForecastResult};
use crate::forecaster::{Forecaster, check_finite};

/// Level + trend smoothing; forecasts `level + h·trend`.
#[derive(Debug, Clone)]
pub struct HoltForecaster {
    alpha: f64,
    beta: f64,
}

impl HoltForecaster {
    /// `alpha` smooths the level, `beta` the trend. Both must lie in (0, 1].
    pub fn new(alpha: f64, beta: f64) -> ForecastResult<Self> {
        for (name, v) in [("alpha", alpha), ("beta", beta)] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(ForecastError::InvalidModel(format!(
                    "{name} = {v} must be in (0, 1]"
                )));
            }
        }
        Ok(Self { alpha, beta })
    }
}

impl Default for HoltForecaster {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.3,
        }
    }
}

impl Forecaster for HoltForecaster {
    fn name(&self) -> &'static str {
        "holt"
    }

    fn predict(&self, series: &[f64], horizon: usize) -> ForecastResult<Vec<f64>> {
        check_finite(series)?;
        if series.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: series.len(),
            });
        }

        let mut level = series[0];
        let mut trend = series[1] - series[0];
        for &x in &series[1..] {
            let prev = level;
            level = self.alpha * x + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev) + (1.0 - self.beta) * trend;
        }

        Ok((1..=horizon).map(|h| level + h as f64 * trend).collect())
    }
}
