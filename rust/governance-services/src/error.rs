//! Error types for remote service calls.

use thiserror::Error;

/// Errors raised while talking to a remote governance service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The service answered with an explicit failure.
    #[error("{operation} rejected by service: {message}")]
    Rejected {
        operation: String,
        message: String,
        retryable: bool,
    },

    /// Network/connection errors.
    #[error("Service transport failed: {0}")]
    Transport(String),

    #[error("Service call timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Failed to decode service response: {0}")]
    Decode(String),

    /// Client construction or URL errors.
    #[error("Invalid service configuration: {0}")]
    Configuration(String),
}

impl ServiceError {
    /// Whether retrying the same call might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { retryable, .. } => *retryable,
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout { seconds: 0 }
        } else if err.is_connect() {
            ServiceError::Transport(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ServiceError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServiceError::Rejected {
            operation: "get_framework".to_string(),
            message: "framework not found".to_string(),
            retryable: false,
        };
        assert_eq!(
            err.to_string(),
            "get_framework rejected by service: framework not found"
        );

        let err = ServiceError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Service Unavailable");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ServiceError::Timeout { seconds: 30 }.is_retryable());
        assert!(ServiceError::Transport("reset".into()).is_retryable());
        assert!(ServiceError::Http {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!ServiceError::Http {
            status: 404,
            message: String::new()
        }
        .is_retryable());
        assert!(!ServiceError::Decode("bad json".into()).is_retryable());
    }
}
