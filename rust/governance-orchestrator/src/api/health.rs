//! Health endpoints.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::health::SystemHealthMetrics;
use crate::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/system/health", get(system_health))
}

/// Liveness response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Liveness of the orchestrator process itself.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Scored health of the governance platform.
async fn system_health(State(state): State<AppState>) -> Json<SystemHealthMetrics> {
    Json(state.orchestrator.monitor_system_health().await)
}
