mod aggregator;
mod api;
mod cloud;
mod config;
mod error;
mod logging;
mod resolve;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::aggregator::Aggregator;
use crate::cloud::{compute::ComputeClient, run::RunClient, GoogleApi};
use crate::config::Config;
use crate::resolve::revision::DisplayZone;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config file; environment variables override it
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    }
    .with_env_overrides();

    logging::init(&config.logging);
    tracing::info!("Starting tagviewd");

    for (variable, value) in &config.rejected_overrides {
        tracing::warn!(variable = %variable, value = %value, "Invalid environment override, ignoring");
    }

    config.validate()?;

    let api = GoogleApi::new(&config.cloud).context("Failed to create cloud API client")?;
    let run = Arc::new(RunClient::new(api.clone(), config.cloud.run_endpoint.clone()));
    let negs = Arc::new(ComputeClient::new(api, config.cloud.compute_endpoint.clone()));

    let zone = DisplayZone::from_config(config.viewer.timezone.as_deref());
    let aggregator = Aggregator::new(run, negs, zone)
        .with_max_concurrent_lookups(config.viewer.max_concurrent_lookups);

    tracing::info!(
        project = %config.viewer.project,
        location = %config.viewer.location,
        identifying_label = %config.viewer.identifying_label,
        max_revisions = config.viewer.max_revisions,
        "Serving tagged revisions"
    );

    let app_state = api::routes::AppState {
        aggregator,
        viewer: Arc::new(config.viewer.clone()),
        static_page: Arc::new(config.api.static_page.clone()),
    };
    let app = api::routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("Server is running on {}", config.api.listen);

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await?;

    tracing::info!("Shutdown signal received");
    cancel.cancel();

    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on ctrl-c, or on SIGTERM where the platform stops containers with it
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    Ok(())
}
