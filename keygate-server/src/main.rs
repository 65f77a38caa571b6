//! Keygate Server - HTTP API for WebAuthn ceremonies
//!
//! Exposes keygate-core ceremonies via HTTP endpoints:
//! - POST /webauthn/register/start - Creation options for a user
//! - POST /webauthn/register/finish - Verify an attestation
//! - POST /webauthn/authenticate/start - Request options for a user
//! - POST /webauthn/authenticate/finish - Verify an assertion
//! - GET /health - Health check

use std::net::SocketAddr;

use anyhow::Context;
use keygate_server::{create_router_with_config, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("keygate_server=info,keygate_core=info,tower_http=info")
        }))
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    let app = create_router_with_config(&config)
        .await
        .context("failed to initialize relying party")?;

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        rp_id = %config.rp_id,
        origin = %config.rp_origin,
        "Keygate server listening on http://{}",
        addr
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
