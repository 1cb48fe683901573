//! The infrastructure capability the decision engine drives.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

/// Boxed future returned by [`InfrastructureStrategy`] methods.
pub type StrategyFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Add, remove and count running instances.
///
/// Failures are reported as `false`, never raised: the caller retries on the
/// next poll.
pub trait InfrastructureStrategy: Send {
    /// Start one instance. `true` on success.
    fn add_service(&mut self) -> StrategyFuture<'_, bool>;

    /// Stop one instance. `true` on success.
    fn remove_service(&mut self) -> StrategyFuture<'_, bool>;

    /// Re-read the backends and return the live instance count.
    fn get_running_services(&mut self) -> StrategyFuture<'_, usize>;
}

/// Identity of one service instance, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(u64);

impl ServiceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ServiceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source shared by every host in a fleet.
#[derive(Debug)]
pub struct ServiceIdGenerator {
    next: AtomicU64,
}

impl ServiceIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Skip past ids already in use, e.g. after adopting running instances.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn generate(&self) -> ServiceId {
        ServiceId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Ensure future ids are greater than `seen`.
    pub fn observe(&self, seen: u64) {
        self.next.fetch_max(seen.saturating_add(1), Ordering::Relaxed);
    }
}

impl Default for ServiceIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_monotonic_from_one() {
        let ids = ServiceIdGenerator::new();
        assert_eq!(ids.generate().get(), 1);
        assert_eq!(ids.generate().get(), 2);
        assert_eq!(ids.generate().to_string(), "3");
    }

    #[test]
    fn observe_skips_adopted_ids() {
        let ids = ServiceIdGenerator::new();
        ids.observe(7);
        assert_eq!(ids.generate().get(), 8);
        ids.observe(3);
        assert_eq!(ids.generate().get(), 9);
    }

    #[test]
    fn unique_across_threads() {
        let ids = Arc::new(ServiceIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..100).map(|_| ids.generate()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 400);
    }
}
