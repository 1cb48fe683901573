//! nfscale-fleet — where service instances run.
//!
//! ```text
//! InfrastructureStrategy (trait)
//!   └── Fleet                      first-fit add, LIFO-across-hosts remove
//!       ├── ServiceIdGenerator     shared monotonic ids
//!       └── HostAdapter × N        one per configured host, in order
//!           └── BackendClient      list / create / stop / remove
//!               └── DockerBackend  Docker Engine HTTP API
//! ```
//!
//! The backend is the source of truth. Each host's running list is local
//! bookkeeping that is only exact right after `get_running_services`.

pub mod backend;
pub mod docker;
pub mod error;
pub mod fleet;
pub mod host;
pub mod strategy;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{BackendClient, BackendFuture, CreateRequest, ServiceHandle};
pub use docker::DockerBackend;
pub use error::{BackendError, BackendResult};
pub use fleet::Fleet;
pub use host::HostAdapter;
pub use strategy::{InfrastructureStrategy, ServiceId, ServiceIdGenerator, StrategyFuture};
