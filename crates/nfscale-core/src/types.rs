//! Domain types shared across the control loop.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque pointer into the metric stream.
///
/// The metric store hands these out as sample ids; the engine only ever
/// passes them back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One aggregated CPU sample window, as produced by the metric store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Sum of `cpu_usage` over every entry in the window.
    pub aggregate_cpu: f64,
    /// Number of entries summed into `aggregate_cpu`. Always non-zero.
    pub sample_count: u64,
    /// Stream position of this sample.
    pub cursor: Cursor,
}

impl MetricSample {
    /// Mean CPU usage across the window.
    pub fn mean_cpu(&self) -> f64 {
        self.aggregate_cpu / self.sample_count as f64
    }
}

/// Hysteresis bounds gating scale-out and scale-in.
///
/// Invariant (checked by `Config::validate`): `lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingThresholds {
    #[serde(default = "default_upper")]
    pub upper: f64,
    #[serde(default = "default_lower")]
    pub lower: f64,
}

impl Default for ScalingThresholds {
    fn default() -> Self {
        Self {
            upper: default_upper(),
            lower: default_lower(),
        }
    }
}

fn default_upper() -> f64 {
    70.0
}

fn default_lower() -> f64 {
    30.0
}

/// `(p, d, q)` order of an ARIMA model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArimaOrder {
    #[serde(default = "default_p")]
    pub p: usize,
    #[serde(default)]
    pub d: usize,
    #[serde(default)]
    pub q: usize,
}

impl Default for ArimaOrder {
    fn default() -> Self {
        Self { p: 1, d: 0, q: 0 }
    }
}

fn default_p() -> usize {
    1
}

/// Model order plus how far ahead to forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastConfig {
    pub order: ArimaOrder,
    pub lookahead: usize,
}
