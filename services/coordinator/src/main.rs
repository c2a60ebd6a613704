//! wormhole coordinator
//!
//! Serves the migration control surface for one node. Configuration comes
//! from the environment (see `config.rs`); control-plane credentials are
//! discovered in-cluster unless an explicit API URL is given.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wormhole_coordinator::{
    api, config,
    coordinator::MigrationCoordinator,
    invoker::ExternalCommand,
    peer::HttpPeerClient,
    pods::{KubeClient, PodLifecycle},
    registry::DestinationRegistry,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to WORMHOLE_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting wormhole coordinator");
    info!(
        listen_addr = %config.listen_addr,
        checkpoint_cmd = %config.checkpoint_cmd.display(),
        restore_cmd = %config.restore_cmd.display(),
        namespace = %config.pods.namespace,
        ready_timeout_secs = config.ready.timeout.as_secs(),
        "Configuration loaded"
    );

    // An unusable control plane is fatal at startup only
    let kube = KubeClient::new(&config.kube, config.http_timeout)
        .context("Failed to set up the Kubernetes API client")?;
    info!(api = %kube.base_url(), "Kubernetes API client ready");

    let peer = HttpPeerClient::new(config.http_timeout).context("Failed to build HTTP client")?;

    let registry = Arc::new(DestinationRegistry::new());
    let coordinator = MigrationCoordinator::new(
        registry,
        Arc::new(ExternalCommand::new(config.checkpoint_cmd.clone())),
        PodLifecycle::new(Arc::new(kube), config.ready.clone()),
        Arc::new(peer),
        config.pods.clone(),
        config.runtime_scheme.clone(),
    );
    let state = AppState::new(coordinator, Arc::new(ExternalCommand::new(config.restore_cmd.clone())));

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            true
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
            false
        }
    };

    if interrupted {
        let _ = shutdown_tx.send(true);

        // In-flight migrations get a bounded chance to finish
        let shutdown_timeout = std::time::Duration::from_secs(10);
        if tokio::time::timeout(shutdown_timeout, &mut server_handle)
            .await
            .is_err()
        {
            warn!("HTTP server did not shut down in time");
        }
    }

    info!("Coordinator shutdown complete");
    Ok(())
}
