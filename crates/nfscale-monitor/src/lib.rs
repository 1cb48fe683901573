//! nfscale-monitor — reads the aggregated CPU metric stream.
//!
//! The metric store is an append-only stream of sample windows. This crate
//! fetches it incrementally through a cursor and keeps the bounded series
//! the forecaster consumes.
//!
//! ```text
//! MetricWindow ──poll──▶ MetricSource::fetch(count, cursor)
//!      │                       │
//!      │◀── Vec<MetricSample> ─┘
//!      └── series(): mean CPU per sample, oldest → newest
//! ```

pub mod error;
pub mod source;
pub mod window;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{MonitorError, MonitorResult};
pub use source::{FetchFuture, HttpMetricSource, MetricSource};
pub use window::MetricWindow;
