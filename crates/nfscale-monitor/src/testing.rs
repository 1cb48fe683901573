//! In-memory metric stream for tests.

use std::sync::{Arc, Mutex, MutexGuard};

use nfscale_core::{Cursor, MetricSample};

use crate::error::MonitorError;
use crate::source::{FetchFuture, MetricSource};

#[derive(Debug, Default)]
struct StreamState {
    samples: Vec<MetricSample>,
    calls: Vec<(usize, Option<Cursor>)>,
    failing: bool,
}

/// Append-only stream with the metric store's cursor semantics.
///
/// Clones share the stream, so a test can keep pushing samples after
/// handing a clone to the code under test.
#[derive(Debug, Clone, Default)]
pub struct StreamSource {
    state: Arc<Mutex<StreamState>>,
}

impl StreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append a sample of two entries whose mean CPU is `cpu`.
    pub fn push(&self, id: &str, cpu: f64) {
        self.lock().samples.push(MetricSample {
            aggregate_cpu: cpu * 2.0,
            sample_count: 2,
            cursor: Cursor::new(id),
        });
    }

    /// Append one sample per value, with ids continuing the stream.
    pub fn extend(&self, cpus: &[f64]) {
        for &cpu in cpus {
            let id = format!("s{}", self.len());
            self.push(&id, cpu);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(count, cursor)` of every fetch so far.
    pub fn calls(&self) -> Vec<(usize, Option<Cursor>)> {
        self.lock().calls.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }
}

impl MetricSource for StreamSource {
    fn fetch<'a>(&'a self, count: usize, cursor: Option<&'a Cursor>) -> FetchFuture<'a> {
        let mut state = self.lock();
        state.calls.push((count, cursor.cloned()));
        let result = if state.failing {
            Err(MonitorError::Malformed("stream unavailable".to_string()))
        } else {
            let all = &state.samples;
            let slice = match cursor {
                Some(c) => {
                    let start = all.iter().position(|s| &s.cursor == c).map_or(0, |p| p + 1);
                    &all[start..]
                }
                None => &all[all.len().saturating_sub(count)..],
            };
            Ok(slice.iter().take(count).cloned().collect())
        };
        Box::pin(async move { result })
    }
}
