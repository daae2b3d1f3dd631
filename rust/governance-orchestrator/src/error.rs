//! Orchestrator error type.

use governance_services::ServiceError;
use thiserror::Error;

/// Errors surfaced by the orchestrator to its callers.
///
/// Domain problems observed while a workflow runs are recorded as
/// [`ExecutionError`](crate::workflow::ExecutionError) entries on the
/// execution; this type is what aborts a call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Pre-flight validation rejected the configuration.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Execution not found: {0}")]
    NotFound(String),

    #[error("Execution {0} was cancelled")]
    Cancelled(String),

    /// Cancel or subscribe on an execution that already finished.
    #[error("Execution {0} is not running")]
    NotRunning(String),

    #[error("Execution id {0} already exists")]
    DuplicateExecution(String),

    /// A pipeline stage failed.
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    /// Required telemetry could not be read.
    #[error("Data unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Create a stage failure.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::NotFound(_) => "EXECUTION_NOT_FOUND",
            Self::Cancelled(_) => "EXECUTION_CANCELLED",
            Self::NotRunning(_) => "EXECUTION_NOT_RUNNING",
            Self::DuplicateExecution(_) => "DUPLICATE_EXECUTION",
            Self::Stage { .. } => "STAGE_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Unavailable(_) => "DATA_UNAVAILABLE",
            Self::Service(_) => "SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_is_transparent() {
        let err: OrchestratorError = ServiceError::Timeout { seconds: 30 }.into();
        assert_eq!(err.to_string(), "Service call timed out after 30 seconds");
        assert_eq!(err.code(), "SERVICE_ERROR");
    }

    #[test]
    fn test_stage_error_display() {
        let err = OrchestratorError::stage("load_rules", "rule service down");
        assert_eq!(err.to_string(), "Stage 'load_rules' failed: rule service down");
        assert_eq!(err.code(), "STAGE_FAILED");
    }
}
