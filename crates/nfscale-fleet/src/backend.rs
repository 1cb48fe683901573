//! Container backend capability.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

/// Boxed future returned by [`BackendClient`] methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

/// Handle to one running instance on a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHandle {
    /// Backend-assigned instance id.
    pub id: String,
    /// Creation time, seconds since the epoch. Orders instances on a host.
    pub created: i64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ServiceHandle {
    /// The value of `label` parsed as a service id, if present.
    pub fn service_id(&self, label: &str) -> Option<u64> {
        self.labels.get(label)?.parse().ok()
    }
}

/// Everything needed to start one detached instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub image: String,
    /// Empty means the image's default command.
    pub command: Vec<String>,
    pub environment: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub network_mode: Option<String>,
    pub detach: bool,
}

/// RPC surface of one infrastructure host.
///
/// Injected into [`crate::HostAdapter`] so tests can substitute an
/// in-memory backend.
pub trait BackendClient: Send + Sync {
    /// Running instances carrying `label`.
    fn list<'a>(&'a self, label: &'a str) -> BackendFuture<'a, Vec<ServiceHandle>>;

    /// Create and start an instance.
    fn create<'a>(&'a self, request: &'a CreateRequest) -> BackendFuture<'a, ServiceHandle>;

    fn stop<'a>(&'a self, handle: &'a ServiceHandle) -> BackendFuture<'a, ()>;

    fn remove<'a>(&'a self, handle: &'a ServiceHandle) -> BackendFuture<'a, ()>;
}
