//! nfscale-forecast — near-future CPU demand forecasting.
//!
//! Every model implements [`Forecaster`]: a pure function from a
//! chronological series (oldest first) to `horizon` predicted values.
//! The decision engine only ever sees the trait, so models can be swapped
//! from configuration without touching the control loop.
//!
//! # Models
//!
//! - **`arima`** — ARIMA(p, d, q), refit on the whole series each call
//! - **`smoothing`** — Holt level/trend exponential smoothing
//! - **`trend`** — least-squares linear trend and a trailing moving average

pub mod arima;
pub mod error;
pub mod forecaster;
mod linalg;
pub mod smoothing;
pub mod trend;

pub use arima::ArimaForecaster;
pub use error::{ForecastError, ForecastResult};
pub use forecaster::{Forecaster, from_config};
pub use smoothing::HoltForecaster;
pub use trend::{LinearTrendForecaster, MovingAverageForecaster};
