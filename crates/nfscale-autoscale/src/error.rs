//! Decision engine error types.

use nfscale_forecast::ForecastError;
use nfscale_monitor::MonitorError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Why a cycle was skipped. Logged, never propagated out of the loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metric fetch failed: {0}")]
    Monitor(#[from] MonitorError),

    #[error("forecast failed: {0}")]
    Forecast(#[from] ForecastError),

    #[error("forecast task aborted: {0}")]
    Aborted(String),

    #[error("previous forecast is still running")]
    ForecastInFlight,
}
