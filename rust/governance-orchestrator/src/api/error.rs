//! HTTP mapping of orchestrator errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::OrchestratorError;

/// Error response body: `{"error": {"code", "message"}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// Handler error wrapping [`OrchestratorError`].
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OrchestratorError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Cancelled(_)
            | OrchestratorError::NotRunning(_)
            | OrchestratorError::DuplicateExecution(_) => StatusCode::CONFLICT,
            OrchestratorError::Stage { .. }
            | OrchestratorError::Unavailable(_)
            | OrchestratorError::Timeout { .. }
            | OrchestratorError::Service(_)
            | OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        }
        let body = Json(ErrorBody {
            error: ErrorDetail {
                code: self.0.code(),
                message: self.0.to_string(),
            },
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (OrchestratorError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (OrchestratorError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (OrchestratorError::Cancelled("x".into()), StatusCode::CONFLICT),
            (OrchestratorError::NotRunning("x".into()), StatusCode::CONFLICT),
            (OrchestratorError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
