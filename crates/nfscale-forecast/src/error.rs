//! Forecast error types.

use std::time::Duration;

use thiserror::Error;

/// Failures of a single model fit or prediction.
///
/// None of these are fatal: the decision engine skips the cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("series contains a non-finite value at index {0}")]
    NonFinite(usize),

    #[error("normal equations are singular")]
    SingularMatrix,

    #[error("model fit did not converge after {0} iterations")]
    NonConvergence(usize),

    #[error("residual variance is degenerate: {0}")]
    DegenerateVariance(f64),

    #[error("invalid model parameters: {0}")]
    InvalidModel(String),

    #[error("forecast timed out after {0:?}")]
    Timeout(Duration),
}

pub type ForecastResult<T> = Result<T, ForecastError>;
