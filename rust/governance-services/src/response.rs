//! Success/failure result of a remote service call.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Result of a remote service call.
///
/// Remote services answer with a `{success, data, message}` envelope. The
/// envelope is decoded once at the transport boundary into this tagged union
/// so callers never inspect untyped maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceResponse<T> {
    /// Call completed successfully.
    Success(T),
    /// Call failed.
    Failure {
        error: String,
        retryable: bool,
    },
}

impl<T> ServiceResponse<T> {
    /// Create a success response.
    #[must_use]
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    /// Create a failure response.
    #[must_use]
    pub fn failure(error: impl Into<String>, retryable: bool) -> Self {
        Self::Failure {
            error: error.into(),
            retryable,
        }
    }

    /// Check if the response is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Discard the failure detail.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure { .. } => None,
        }
    }

    /// Transform the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceResponse<U> {
        match self {
            Self::Success(value) => ServiceResponse::Success(f(value)),
            Self::Failure { error, retryable } => ServiceResponse::Failure { error, retryable },
        }
    }

    /// Convert into a `Result`, naming the operation in the error.
    pub fn into_result(self, operation: &str) -> Result<T, ServiceError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure { error, retryable } => Err(ServiceError::Rejected {
                operation: operation.to_string(),
                message: error,
                retryable,
            }),
        }
    }
}

impl<T> From<ServiceError> for ServiceResponse<T> {
    fn from(err: ServiceError) -> Self {
        let retryable = err.is_retryable();
        Self::Failure {
            error: err.to_string(),
            retryable,
        }
    }
}

impl<T> From<Result<T, ServiceError>> for ServiceResponse<T> {
    fn from(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => err.into(),
        }
    }
}
