//! Governance Orchestrator - data-governance workflow orchestration
//!
//! Coordinates three generations of classification workflows against remote
//! services and merges their results:
//!
//! - **v1 classification**: rule- and framework-based classification with
//!   pre-flight validation, sampling, calibration and quality filtering
//! - **v2 ML pipeline**: ensemble training, validation, drift detection and
//!   deployment
//! - **v3 AI reasoning**: agent reasoning with explanations
//! - **Multi-version**: runs all three and combines them by consensus
//!
//! Alongside workflows it scores platform health and recommends resource
//! allocations.
//!
//! # Architecture
//!
//! - [`config`]: layered configuration
//! - [`workflow`]: pipelines, stage executor, execution tracking and output
//! - [`orchestrator`]: the [`WorkflowOrchestrator`] facade
//! - [`health`]: [`HealthMonitor`](health::HealthMonitor)
//! - [`optimizer`]: [`ResourceOptimizer`](optimizer::ResourceOptimizer)
//! - [`api`]: HTTP API endpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use governance_orchestrator::{config::OrchestratorConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OrchestratorConfig::load(None)?;
//!     let shutdown = tokio_util::sync::CancellationToken::new();
//!     let app = create_app(config, shutdown)?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8090").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod optimizer;
pub mod orchestrator;
pub mod server;
pub mod workflow;

use std::sync::Arc;

use config::OrchestratorConfig;

pub use error::OrchestratorError;
pub use orchestrator::{ServiceSet, WorkflowOrchestrator};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OrchestratorConfig>,
    pub orchestrator: Arc<WorkflowOrchestrator>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"OrchestratorConfig")
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}
