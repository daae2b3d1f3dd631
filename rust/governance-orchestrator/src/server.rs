//! HTTP server setup and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use governance_services::http::{
    HttpAiService, HttpClassificationService, HttpMlService, HttpServiceConfig,
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api;
use crate::config::{OrchestratorConfig, ServicesConfig};
use crate::logging::OpTimer;
use crate::orchestrator::{ServiceSet, WorkflowOrchestrator};
use crate::{log_banner, log_init_step, log_init_warning, log_success, AppState};

/// Orchestrator version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the application against the configured HTTP services.
///
/// Starts the retention task, which stops when `shutdown` is cancelled.
pub fn create_app(config: OrchestratorConfig, shutdown: CancellationToken) -> anyhow::Result<Router> {
    let overall_timer = OpTimer::new("server", "create_app");

    log_banner!(
        format!("🛡️  Governance Orchestrator v{VERSION}"),
        format!(
            "Classification: {} | ML: {} | AI: {}",
            config.services.classification_url, config.services.ml_url, config.services.ai_url
        )
    );

    // [1/4] Remote service clients
    let step_timer = OpTimer::new("server", "services");
    let services = http_services(&config.services)?;
    log_init_step!(1, 4, "Services", "🔌 HTTP clients ready");
    if config.services.api_key.is_none() {
        log_init_warning!("No API key configured. Governance service calls are unauthenticated.");
    }
    step_timer.finish();

    // [2/4] Orchestrator
    let step_timer = OpTimer::new("server", "orchestrator");
    let orchestrator = Arc::new(WorkflowOrchestrator::new(services, &config));
    log_init_step!(2, 4, "Orchestrator", "🎭 Pipelines v1/v2/v3 ready");
    step_timer.finish();

    // [3/4] Retention
    orchestrator.spawn_retention_task(shutdown);
    log_init_step!(
        3,
        4,
        "Retention",
        format!(
            "🗄️  ttl {}s, max {} executions, every {}s",
            config.retention.ttl_secs,
            config.retention.max_entries,
            config.retention.prune_interval_secs
        )
    );

    // [4/4] Router
    let step_timer = OpTimer::new("server", "router");
    let state = AppState {
        config: Arc::new(config),
        orchestrator,
    };
    let app = build_router(state);
    log_init_step!(4, 4, "Router", "🌐 Routes + middleware configured");
    step_timer.finish();

    overall_timer.finish();
    log_success!("Governance orchestrator created successfully");
    Ok(app)
}

/// Routes plus CORS, request timeout and HTTP tracing.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.timeout_secs);
    api::create_router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP clients for the configured endpoints.
pub fn http_services(config: &ServicesConfig) -> anyhow::Result<ServiceSet> {
    let settings = |base_url: &str| {
        let settings = HttpServiceConfig::new(base_url)
            .with_timeout(Duration::from_secs(config.timeout_secs));
        match &config.api_key {
            Some(key) => settings.with_api_key(key.clone()),
            None => settings,
        }
    };

    let classification = Arc::new(HttpClassificationService::new(&settings(
        &config.classification_url,
    ))?);
    Ok(ServiceSet {
        platform: Arc::clone(&classification) as _,
        classification,
        ml: Arc::new(HttpMlService::new(&settings(&config.ml_url))?),
        ai: Arc::new(HttpAiService::new(&settings(&config.ai_url))?),
    })
}
