mod config;
mod delay;
mod metrics;
mod params;
mod simulation;
mod web;

use std::sync::Arc;
use tracing::info;

use crate::config::{Config, LogConfig};
use crate::simulation::ThreadDice;
use crate::web::server::{AppState, WebServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config (optional path argument)
    let config_path = std::env::args().nth(1);
    let config = Config::load_or_default(config_path.as_deref())?;

    init_tracing(&config.log);

    info!("📈 kpi-sim v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config loaded from {}", path),
        None => info!("Using {} or built-in defaults", config::DEFAULT_CONFIG_PATH),
    }
    info!(
        "Defaults: success_rate={} max_delay={}ms error_rate={} timeout={}s",
        config.simulation.success_rate,
        config.simulation.max_delay_ms,
        config.simulation.error_rate,
        config.server.request_timeout_secs
    );

    let state = AppState::new(Arc::new(config), Arc::new(ThreadDice));
    let metrics = state.metrics.clone();
    let web = WebServer::new(state);
    web.run(shutdown_signal()).await?;

    info!("kpi-sim stopped after serving {} requests", metrics.total_requests());
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kpi_sim=info,tower_http=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining in-flight requests");
}
