//! nfscale-core — shared types, configuration, and HTTP plumbing.
//!
//! Everything the other nfscale crates agree on lives here:
//!
//! - **`config`** — the `nfscale.toml` document loaded once at startup
//! - **`types`** — metric samples, cursors, thresholds, forecast order
//! - **`http`** — a minimal HTTP/1 JSON client used to talk to the metric
//!   store and the container backend

pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, ConfigResult, HttpError};
pub use http::{HttpClient, HttpResponse};
pub use types::*;
