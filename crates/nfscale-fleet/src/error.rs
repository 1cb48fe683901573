//! Backend error types.

use std::time::Duration;

use nfscale_core::HttpError;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Failures talking to a container backend.
///
/// The allocator never propagates these: the attempted action reports
/// failure and the next poll tries again.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend rejected request ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("unexpected backend response: {0}")]
    Decode(String),

    #[error("invalid backend request: {0}")]
    Invalid(String),
}

impl BackendError {
    /// Whether retrying later could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::RequestFailed { status, .. } => *status >= 500,
            Self::Decode(_) | Self::Invalid(_) => false,
        }
    }
}

impl From<HttpError> for BackendError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(d) => Self::Timeout(d),
            HttpError::Connect { .. } | HttpError::Handshake(_) | HttpError::Request(_) => {
                Self::Unavailable(err.to_string())
            }
            HttpError::Build(_) | HttpError::Encode(_) => Self::Invalid(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(BackendError::Unavailable("refused".into()).is_transient());
        assert!(
            BackendError::RequestFailed {
                status: 500,
                message: "oops".into()
            }
            .is_transient()
        );
        assert!(
            !BackendError::RequestFailed {
                status: 404,
                message: "no such image".into()
            }
            .is_transient()
        );
        assert!(!BackendError::Decode("garbage".into()).is_transient());
    }

    #[test]
    fn http_timeout_maps_to_timeout() {
        let err: BackendError = HttpError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(err, BackendError::Timeout(d) if d == Duration::from_secs(3)));
    }
}
