//! Metric source error types.

use nfscale_core::HttpError;
use thiserror::Error;

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors fetching or decoding metric samples. All are transient from the
/// engine's point of view: the cycle is skipped and retried next poll.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("metric store unreachable: {0}")]
    Http(#[from] HttpError),

    #[error("metric store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed metric response: {0}")]
    Malformed(String),
}
