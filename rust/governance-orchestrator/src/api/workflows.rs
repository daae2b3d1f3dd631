//! Workflow submission endpoints.
//!
//! Single-version submissions are checked synchronously against the
//! configuration rules that need no remote calls, then run in the
//! background. Multi-version submissions skip that check: a bad version
//! config fails only that version. The response carries the execution id
//! to poll.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use super::ApiError;
use crate::workflow::validation::{classification_preflight, validate_ai, validate_ml};
use crate::workflow::{
    AiReasoningConfig, ClassificationWorkflowConfig, MlPipelineConfig, MultiVersionWorkflowConfig,
};
use crate::AppState;

/// Header naming the caller whose permissions are validated.
pub const CALLER_HEADER: &str = "x-caller-id";

const ANONYMOUS_CALLER: &str = "anonymous";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workflows/classification", post(submit_classification))
        .route("/api/v1/workflows/ml", post(submit_ml))
        .route("/api/v1/workflows/ai", post(submit_ai))
        .route("/api/v1/workflows/multi-version", post(submit_multi_version))
}

/// Accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub execution_id: String,
    pub status: &'static str,
}

type Accepted = (StatusCode, Json<SubmitResponse>);

fn accepted(execution_id: String) -> Accepted {
    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            execution_id,
            status: "pending",
        }),
    )
}

fn caller(headers: &HeaderMap) -> String {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_CALLER)
        .to_string()
}

async fn submit_classification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<ClassificationWorkflowConfig>,
) -> Result<Accepted, ApiError> {
    classification_preflight(&config).into_result()?;
    let id = state
        .orchestrator
        .submit_classification(config, caller(&headers))?;
    tracing::info!(execution_id = %id, "Classification workflow submitted");
    Ok(accepted(id))
}

async fn submit_ml(
    State(state): State<AppState>,
    Json(config): Json<MlPipelineConfig>,
) -> Result<Accepted, ApiError> {
    validate_ml(&config).into_result()?;
    let id = state.orchestrator.submit_ml_pipeline(config)?;
    tracing::info!(execution_id = %id, "ML pipeline submitted");
    Ok(accepted(id))
}

async fn submit_ai(
    State(state): State<AppState>,
    Json(config): Json<AiReasoningConfig>,
) -> Result<Accepted, ApiError> {
    validate_ai(&config).into_result()?;
    let id = state.orchestrator.submit_ai_reasoning(config)?;
    tracing::info!(execution_id = %id, "AI reasoning workflow submitted");
    Ok(accepted(id))
}

async fn submit_multi_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<MultiVersionWorkflowConfig>,
) -> Result<Accepted, ApiError> {
    let id = state
        .orchestrator
        .submit_multi_version(config, caller(&headers))?;
    tracing::info!(execution_id = %id, "Multi-version workflow submitted");
    Ok(accepted(id))
}
