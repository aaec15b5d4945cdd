//! sheaf HTTP server
//!
//! Exposes the invocation trigger, the status reader and the published
//! snapshot over HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use sheaf_client::{KvStoreEnum, UpstreamClient};
use sheaf_core::{HarvestService, load_sheaf_config};

use sheaf_server::{AppState, ServerConfig, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let config = ServerConfig::parse();

    let sheaf_config = load_sheaf_config(config.config.clone())?.ok_or_else(|| {
        anyhow::anyhow!(
            "No configuration file found. Create ~/.config/sheaf/sheaf.toml or set SHEAF_CONFIG"
        )
    })?;
    sheaf_config
        .validate()
        .context("Invalid configuration")?;

    // Fail fast on an unusable universe instead of on the first invocation
    let universe = sheaf_core::Universe::from_config(&sheaf_config.universe)
        .context("Failed to load the universe")?;
    info!("Universe has {} items", universe.len());

    let store = if config.memory_store {
        warn!("Using the in-memory store; state is lost on restart");
        KvStoreEnum::memory()
    } else {
        let url = config
            .kv_rest_url
            .as_deref()
            .context("KV_REST_URL is not set")?;
        let token = config
            .kv_rest_token
            .as_deref()
            .context("KV_REST_TOKEN is not set")?;
        KvStoreEnum::rest(url, token, &sheaf_config.http, sheaf_config.retry.clone())
            .context("Failed to create key-value store client")?
    };

    let upstream = UpstreamClient::new(
        &sheaf_config.provider,
        config.provider_api_key.clone(),
        &sheaf_config.http,
        sheaf_config.retry.clone(),
    )
    .context("Failed to create provider client")?;

    if config.admin_token.is_none() {
        warn!("SHEAF_ADMIN_TOKEN is not set; invocation endpoints are disabled");
    }

    // Create shutdown token for graceful shutdown
    let shutdown_token = CancellationToken::new();

    let app_state = AppState::new(
        HarvestService::with_config(store, upstream, sheaf_config.harvest.clone()),
        sheaf_config.universe.clone(),
        config.admin_token.clone(),
        shutdown_token.clone(),
    );

    let app = create_router(app_state, &config);

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid address")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Starting sheaf API server on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    // In-flight invocations finish before the server returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received, starting graceful shutdown...");

    // New invocations are refused from here on
    shutdown_token.cancel();
}
