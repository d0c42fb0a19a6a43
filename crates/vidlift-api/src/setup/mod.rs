//! Application setup and initialization

pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use vidlift_core::Config;
use vidlift_storage::create_storage_set;
use vidlift_transfer::Coordinator;

use crate::state::AppState;

/// Build the coordinator over the configured backends.
pub async fn build_state(config: Config) -> Result<Arc<AppState>> {
    let storage = create_storage_set(&config)
        .await
        .context("Failed to initialize storage backends")?;

    tracing::info!(
        backend = %storage.primary.backend_type(),
        mirrors = storage.mirrors.len(),
        "Storage initialized"
    );

    let coordinator = Coordinator::from_config(&config, storage);
    Ok(AppState::new(config, coordinator))
}

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.is_production())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let state = build_state(config).await?;
    let router = routes::setup_routes(state.clone());

    Ok((state, router))
}
