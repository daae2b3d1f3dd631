//! Execution query and control endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::workflow::{ExecutionFilter, ExecutionStatus, WorkflowExecution, WorkflowKind};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/executions", get(list_executions))
        .route("/api/v1/executions/{id}", get(get_execution))
        .route("/api/v1/executions/{id}/cancel", post(cancel_execution))
}

/// Filters accepted by the list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<ExecutionStatus>,
    pub kind: Option<WorkflowKind>,
    pub parent_id: Option<String>,
}

impl From<ListQuery> for ExecutionFilter {
    fn from(query: ListQuery) -> Self {
        Self {
            status: query.status,
            kind: query.kind,
            parent_id: query.parent_id,
        }
    }
}

/// Execution without its results and output.
#[derive(Debug, Serialize)]
pub struct ExecutionSummary {
    pub id: String,
    pub kind: WorkflowKind,
    pub status: ExecutionStatus,
    pub progress: f64,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub result_count: usize,
    pub error_count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<WorkflowExecution> for ExecutionSummary {
    fn from(execution: WorkflowExecution) -> Self {
        Self {
            id: execution.id,
            kind: execution.kind,
            status: execution.status,
            progress: execution.progress,
            current_step: execution.current_step,
            parent_id: execution.parent_id,
            result_count: execution.results.len(),
            error_count: execution.errors.len(),
            start_time: execution.start_time,
            end_time: execution.end_time,
        }
    }
}

/// Cancel response.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub execution_id: String,
    pub cancelled: bool,
}

async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ExecutionSummary>> {
    let filter = ExecutionFilter::from(query);
    let executions = state.orchestrator.list_executions(&filter);
    Json(executions.into_iter().map(ExecutionSummary::from).collect())
}

async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowExecution>, ApiError> {
    Ok(Json(state.orchestrator.get_execution(&id)?))
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    state.orchestrator.cancel_execution(&id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            execution_id: id,
            cancelled: true,
        }),
    ))
}
