//! nfscale-autoscale — the forecast-driven decision engine.
//!
//! One sequential loop: poll the metric window, forecast, act, sleep.
//!
//! # Decision rule
//!
//! ```text
//! series  = mean CPU of the last `minimal_monitorings` samples
//! signal  = forecast(series, lookahead)[lookahead - 1]
//!
//! if signal > upper:  add one instance
//! if signal < lower:  remove one instance, never below `minimal_services`
//! otherwise:          hold
//!
//! after a successful add or remove the window restarts at "now"
//! ```
//!
//! Backend, metric and forecast failures never stop the loop; they turn the
//! cycle into a skip or a failed action and the next poll tries again.

pub mod engine;
pub mod error;
pub mod settings;

pub use engine::{CycleOutcome, DecisionEngine};
pub use error::{EngineError, EngineResult};
pub use settings::EngineSettings;
