//! Diagnosis server - symptom-based disease prediction service
//!
//! Binds the HTTP API, loads and validates every model artifact once, then
//! serves predictions until shutdown. Requests arriving before the artifacts
//! are loaded are answered with 503.

use anyhow::Result;
use diagnosis_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    PredictionService,
};
use diagnosis_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = SERVER_VERSION, "Starting diagnosis-server");

    let config = ServerConfig::load()?;
    info!(
        node_name = %config.node_name,
        model_dir = %config.model_dir.display(),
        top_k = config.top_k,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all(&components::ALL).await;

    let logger = StructuredLogger::new(&config.node_name);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    // One-time blocking startup phase; nothing is served from the engine until it completes
    let model_dir = config.model_dir.clone();
    let service_config = config.service_config();
    let loaded = tokio::task::spawn_blocking(move || {
        PredictionService::from_artifacts(&model_dir, service_config)
    })
    .await?;

    match loaded {
        Ok(service) => {
            app_state.install_engine(service);
            health_registry.mark_loaded().await;
        }
        Err(e) => {
            let reason = e.to_string();
            logger.log_startup_failure(&reason);
            health_registry.mark_startup_failed(&reason).await;
            api_handle.abort();
            return Err(e.into());
        }
    }

    tokio::select! {
        result = &mut api_handle => {
            result??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
