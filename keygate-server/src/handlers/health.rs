//! Health check handlers
//!
//! Provides health and readiness endpoints for monitoring and orchestration.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status: "healthy" or "degraded"
    pub status: &'static str,
    /// Server version from Cargo.toml
    pub version: &'static str,
    /// Service name
    pub service: &'static str,
    /// Storage backend: "memory" or "postgres"
    pub storage: &'static str,
}

/// GET /health - Health check endpoint
///
/// Reports degraded when the database does not answer.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.storage.check_health().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            "degraded"
        }
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        service: "keygate-server",
        storage: state.storage.name(),
    })
}
