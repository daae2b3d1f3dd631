//! HTTP API endpoints.

pub mod error;
pub mod executions;
pub mod health;
pub mod resources;
pub mod workflows;

use axum::Router;

use crate::AppState;

pub use error::ApiError;

/// Create the API router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(resources::router())
        .merge(workflows::router())
        .merge(executions::router())
}
