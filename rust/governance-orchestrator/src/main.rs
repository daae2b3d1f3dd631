//! Governance Orchestrator - Main Entry Point

use clap::Parser;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

use governance_orchestrator::config::OrchestratorConfig;
use governance_orchestrator::logging::init_tracing;
use governance_orchestrator::server::create_app;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Command-line arguments. Flags override the configuration file.
#[derive(Parser, Debug)]
#[command(name = "governance-orchestrator")]
#[command(about = "Data-governance workflow orchestrator")]
#[command(version)]
struct Args {
    /// Host to bind to.
    #[arg(long, env = "GOVERNANCE_HOST")]
    host: Option<String>,

    /// Port to listen on.
    #[arg(short, long, env = "GOVERNANCE_PORT")]
    port: Option<u16>,

    /// Log level.
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Config file path.
    #[arg(short, long, env = "GOVERNANCE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = OrchestratorConfig::load_unchecked(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging.level, config.logging.json);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;
    tracing::info!("Configuration loaded");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shutdown = CancellationToken::new();
    let app = create_app(config, shutdown.clone())?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
    shutdown.cancel();
}
