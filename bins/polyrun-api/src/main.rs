mod error;
mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use polyrun_common::config::ServiceConfig;
use polyrun_engine::{ExecutionService, LanguageRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub struct AppState {
    pub service: Arc<ExecutionService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Polyrun API booting...");

    let config = ServiceConfig::from_env().context("Invalid POLYRUN_* configuration")?;

    // Load language adapters
    let registry = LanguageRegistry::load_or_builtin(config.languages_file.as_deref())
        .context("Failed to load language configuration")?;
    match &config.languages_file {
        Some(path) => info!("Loaded languages from {}", path.display()),
        None => info!("Using built-in language table"),
    }

    let service = ExecutionService::new(&config, registry)
        .context("Failed to initialize execution service")?;

    let state = Arc::new(AppState {
        service: Arc::new(service),
    });

    let app = routes::app(state, config.max_source_bytes);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("POLYRUN_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight jobs...");
}
