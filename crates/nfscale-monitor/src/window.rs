//! The monitoring window: cursor plus bounded series.

use std::collections::VecDeque;

use nfscale_core::{Cursor, MetricSample};
use tracing::debug;

use crate::error::MonitorResult;
use crate::source::MetricSource;

/// Where the next fetch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CursorState {
    /// Never fetched: backfill the most recent samples.
    Backfill,
    /// Reset after a capacity change: pin the cursor at the newest sample
    /// and keep nothing from before it.
    Reseed,
    /// Continue after this sample.
    At(Cursor),
}

/// Incremental view over the metric stream.
///
/// Holds at most `capacity` mean-CPU values, oldest first. A failed fetch
/// leaves both the cursor and the series untouched.
#[derive(Debug, Clone)]
pub struct MetricWindow {
    capacity: usize,
    state: CursorState,
    series: VecDeque<f64>,
}

impl MetricWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: CursorState::Backfill,
            series: VecDeque::with_capacity(capacity),
        }
    }

    /// Fetch new samples and fold them into the series.
    ///
    /// Returns how many samples were appended.
    pub async fn poll(&mut self, source: &dyn MetricSource) -> MonitorResult<usize> {
        match self.state.clone() {
            CursorState::Backfill => {
                let samples = source.fetch(self.capacity, None).await?;
                Ok(self.absorb(samples, None))
            }
            CursorState::Reseed => {
                let samples = source.fetch(1, None).await?;
                if let Some(newest) = samples.last() {
                    debug!(cursor = %newest.cursor, "window re-seeded");
                    self.state = CursorState::At(newest.cursor.clone());
                }
                Ok(0)
            }
            CursorState::At(cursor) => {
                let samples = source.fetch(self.capacity, Some(&cursor)).await?;
                Ok(self.absorb(samples, Some(&cursor)))
            }
        }
    }

    fn absorb(&mut self, samples: Vec<MetricSample>, after: Option<&Cursor>) -> usize {
        let mut added = 0;
        for sample in samples {
            // Stores that treat the cursor as inclusive hand it back.
            if after == Some(&sample.cursor) {
                continue;
            }
            if self.series.len() == self.capacity {
                self.series.pop_front();
            }
            self.series.push_back(sample.mean_cpu());
            self.state = CursorState::At(sample.cursor);
            added += 1;
        }
        added
    }

    /// Discard the backlog; the next poll starts a fresh window at "now".
    pub fn reset(&mut self) {
        self.series.clear();
        self.state = CursorState::Reseed;
    }

    /// Mean CPU per sample, oldest first.
    pub fn series(&self) -> Vec<f64> {
        self.series.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Whether the series holds `capacity` samples.
    pub fn is_full(&self) -> bool {
        self.series.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current cursor, if one has been seeded.
    pub fn cursor(&self) -> Option<&Cursor> {
        match &self.state {
            CursorState::At(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StreamSource;

    #[tokio::test]
    async fn backfills_then_follows_cursor() {
        let source = StreamSource::new();
        for i in 0..5 {
            source.push(&format!("s{i}"), 10.0 * i as f64);
        }

        let mut window = MetricWindow::new(3);
        assert_eq!(window.poll(&source).await.unwrap(), 3);
        assert_eq!(window.series(), vec![20.0, 30.0, 40.0]);
        assert_eq!(window.cursor().map(Cursor::as_str), Some("s4"));
        assert!(window.is_full());

        source.push("s5", 50.0);
        assert_eq!(window.poll(&source).await.unwrap(), 1);
        assert_eq!(window.series(), vec![30.0, 40.0, 50.0]);
        assert_eq!(source.calls()[1], (3, Some(Cursor::new("s4"))));
    }

    #[tokio::test]
    async fn reset_reseeds_and_discards_backlog() {
        let source = StreamSource::new();
        for i in 0..4 {
            source.push(&format!("s{i}"), 50.0);
        }
        let mut window = MetricWindow::new(3);
        window.poll(&source).await.unwrap();
        assert!(window.is_full());

        window.reset();
        assert!(window.is_empty());
        assert!(window.cursor().is_none());

        source.push("s4", 80.0);
        // Re-seed fetch asks for the newest sample only and keeps none.
        assert_eq!(window.poll(&source).await.unwrap(), 0);
        assert_eq!(source.calls().last().cloned(), Some((1, None)));
        assert_eq!(window.cursor().map(Cursor::as_str), Some("s4"));
        assert!(window.is_empty());

        source.push("s5", 90.0);
        assert_eq!(window.poll(&source).await.unwrap(), 1);
        assert_eq!(window.series(), vec![90.0]);
        assert_eq!(source.calls().last().cloned(), Some((3, Some(Cursor::new("s4")))));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_state_untouched() {
        let source = StreamSource::new();
        source.push("s0", 10.0);
        let mut window = MetricWindow::new(3);
        window.poll(&source).await.unwrap();

        source.set_failing(true);
        assert!(window.poll(&source).await.is_err());
        assert_eq!(window.series(), vec![10.0]);
        assert_eq!(window.cursor().map(Cursor::as_str), Some("s0"));
    }

    #[test]
    fn inclusive_cursor_sample_is_not_double_counted() {
        let mut window = MetricWindow::new(5);
        window.state = CursorState::At(Cursor::new("s1"));
        let samples = vec![
            MetricSample {
                aggregate_cpu: 1.0,
                sample_count: 1,
                cursor: Cursor::new("s1"),
            },
            MetricSample {
                aggregate_cpu: 2.0,
                sample_count: 1,
                cursor: Cursor::new("s2"),
            },
        ];
        let cursor = Cursor::new("s1");
        assert_eq!(window.absorb(samples, Some(&cursor)), 1);
        assert_eq!(window.series(), vec![2.0]);
    }

    #[tokio::test]
    async fn empty_stream_stays_in_backfill() {
        let source = StreamSource::new();
        let mut window = MetricWindow::new(3);
        assert_eq!(window.poll(&source).await.unwrap(), 0);
        assert!(window.cursor().is_none());
        assert_eq!(source.calls()[0], (3, None));
    }
}
