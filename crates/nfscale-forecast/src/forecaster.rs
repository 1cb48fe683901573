//! The forecasting capability and the config-driven factory.

use std::sync::Arc;

use nfscale_core::config::{ForecasterKind, ManagerConfig};
use tracing::info;

use crate::arima::ArimaForecaster;
use crate::error::{ForecastError, ForecastResult};
use crate::smoothing::HoltForecaster;
use crate::trend::{LinearTrendForecaster, MovingAverageForecaster};

/// A time-series model.
///
/// Implementations are pure: `predict` depends only on its arguments and
/// may be called from a blocking worker thread.
pub trait Forecaster: Send + Sync {
    /// Model name for logs.
    fn name(&self) -> &'static str;

    /// Predict the next `horizon` values of a chronological series.
    ///
    /// On success the result has exactly `horizon` elements.
    fn predict(&self, series: &[f64], horizon: usize) -> ForecastResult<Vec<f64>>;
}

/// Build the forecaster selected by `manager.forecaster`.
pub fn from_config(config: &ManagerConfig) -> ForecastResult<Arc<dyn Forecaster>> {
    let forecaster: Arc<dyn Forecaster> = match config.forecaster {
        ForecasterKind::Arima => {
            let arima = ArimaForecaster::new(config.forecast_config().order)?;
            // A window that can never fit the model would skip every cycle.
            if arima.min_observations() > config.minimal_monitorings {
                return Err(ForecastError::InsufficientData {
                    needed: arima.min_observations(),
                    got: config.minimal_monitorings,
                });
            }
            Arc::new(arima)
        }
        ForecasterKind::Holt => Arc::new(HoltForecaster::default()),
        ForecasterKind::Linear => Arc::new(LinearTrendForecaster),
        ForecasterKind::MovingAverage => {
            Arc::new(MovingAverageForecaster::new(config.minimal_monitorings)?)
        }
    };
    info!(model = forecaster.name(), "forecaster selected");
    Ok(forecaster)
}

/// Reject NaN and infinities, reporting the first offending index.
pub(crate) fn check_finite(series: &[f64]) -> ForecastResult<()> {
    match series.iter().position(|v| !v.is_finite()) {
        Some(idx) => Err(ForecastError::NonFinite(idx)),
        None => Ok(()),
    }
}
