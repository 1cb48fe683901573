//! In-memory backend for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{BackendClient, BackendFuture, CreateRequest, ServiceHandle};
use crate::error::BackendError;

/// One call observed by [`MockBackend`], with the container id it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create(String),
    Stop(String),
    Remove(String),
}

#[derive(Debug, Default)]
struct MockState {
    containers: Vec<Container>,
    requests: Vec<CreateRequest>,
    calls: Vec<Call>,
    clock: i64,
    next_id: u64,
    fail_list: bool,
    fail_create: bool,
    fail_stop: bool,
    fail_remove: bool,
}

#[derive(Debug, Clone)]
struct Container {
    handle: ServiceHandle,
    stopped: bool,
}

/// Container host kept in memory.
///
/// Clones share state, so a test can keep one clone to inspect and inject
/// failures while the adapter owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Create requests that reached the backend, including failed ones.
    pub fn requests(&self) -> Vec<CreateRequest> {
        self.lock().requests.clone()
    }

    /// Ids of containers that are running, in creation order.
    pub fn running(&self) -> Vec<String> {
        self.lock()
            .containers
            .iter()
            .filter(|c| !c.stopped)
            .map(|c| c.handle.id.clone())
            .collect()
    }

    /// Containers that exist, running or stopped.
    pub fn existing(&self) -> usize {
        self.lock().containers.len()
    }

    /// Start a container out of band, as an operator would.
    pub fn spawn_external(&self, labels: BTreeMap<String, String>) -> String {
        let mut state = self.lock();
        let handle = state.next_handle(labels);
        let id = handle.id.clone();
        state.containers.push(Container {
            handle,
            stopped: false,
        });
        id
    }

    /// Remove a container out of band.
    pub fn kill_external(&self, id: &str) {
        self.lock().containers.retain(|c| c.handle.id != id);
    }

    pub fn fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    pub fn fail_create(&self, fail: bool) {
        self.lock().fail_create = fail;
    }

    pub fn fail_stop(&self, fail: bool) {
        self.lock().fail_stop = fail;
    }

    pub fn fail_remove(&self, fail: bool) {
        self.lock().fail_remove = fail;
    }
}

impl MockState {
    fn next_handle(&mut self, labels: BTreeMap<String, String>) -> ServiceHandle {
        self.clock += 1;
        self.next_id += 1;
        ServiceHandle {
            id: format!("mock-{}", self.next_id),
            created: self.clock,
            labels,
        }
    }
}

fn down() -> BackendError {
    BackendError::Unavailable("mock backend down".to_string())
}

impl BackendClient for MockBackend {
    fn list<'a>(&'a self, label: &'a str) -> BackendFuture<'a, Vec<ServiceHandle>> {
        let mut state = self.lock();
        state.calls.push(Call::List);
        let result = if state.fail_list {
            Err(down())
        } else {
            // Docker lists newest first.
            Ok(state
                .containers
                .iter()
                .rev()
                .filter(|c| !c.stopped && c.handle.labels.contains_key(label))
                .map(|c| c.handle.clone())
                .collect())
        };
        Box::pin(async move { result })
    }

    fn create<'a>(&'a self, request: &'a CreateRequest) -> BackendFuture<'a, ServiceHandle> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        let result = if state.fail_create {
            state.calls.push(Call::Create(String::new()));
            Err(down())
        } else {
            let handle = state.next_handle(request.labels.clone());
            state.calls.push(Call::Create(handle.id.clone()));
            state.containers.push(Container {
                handle: handle.clone(),
                stopped: false,
            });
            Ok(handle)
        };
        Box::pin(async move { result })
    }

    fn stop<'a>(&'a self, handle: &'a ServiceHandle) -> BackendFuture<'a, ()> {
        let mut state = self.lock();
        state.calls.push(Call::Stop(handle.id.clone()));
        let result = if state.fail_stop {
            Err(down())
        } else {
            match state.containers.iter_mut().find(|c| c.handle.id == handle.id) {
                Some(c) => {
                    c.stopped = true;
                    Ok(())
                }
                None => Err(BackendError::RequestFailed {
                    status: 404,
                    message: format!("No such container: {}", handle.id),
                }),
            }
        };
        Box::pin(async move { result })
    }

    fn remove<'a>(&'a self, handle: &'a ServiceHandle) -> BackendFuture<'a, ()> {
        let mut state = self.lock();
        state.calls.push(Call::Remove(handle.id.clone()));
        let result = if state.fail_remove {
            Err(down())
        } else {
            let before = state.containers.len();
            state.containers.retain(|c| c.handle.id != handle.id);
            if state.containers.len() < before {
                Ok(())
            } else {
                Err(BackendError::RequestFailed {
                    status: 404,
                    message: format!("No such container: {}", handle.id),
                })
            }
        };
        Box::pin(async move { result })
    }
}
