//! Resource optimization endpoint.

use axum::{extract::State, routing::get, Json, Router};

use super::ApiError;
use crate::optimizer::ResourceOptimizationResult;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/v1/system/resources/optimization",
        get(resource_optimization),
    )
}

async fn resource_optimization(
    State(state): State<AppState>,
) -> Result<Json<ResourceOptimizationResult>, ApiError> {
    let result = state.orchestrator.optimize_resource_allocation().await?;
    Ok(Json(result))
}
