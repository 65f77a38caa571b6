//! Router configuration module
//!
//! Configures all routes, middleware layers, and creates the application router.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, Method, StatusCode},
    routing::{get, post},
    Router,
};
use keygate_core::{KeygateError, RelyingParty};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::{
    finish_authentication, finish_registration, health, start_authentication,
    start_registration,
};
use crate::state::AppState;
use crate::storage::{seed_users, StorageBackend};

/// Create the application router with default config and in-memory storage (for testing)
pub async fn create_router() -> Result<Router, KeygateError> {
    let config = Config::default();
    let state = build_state(&config, StorageBackend::in_memory()).await?;
    Ok(create_router_with_state(&config, state))
}

/// Create the application router from configuration, connecting storage as configured
pub async fn create_router_with_config(config: &Config) -> Result<Router, KeygateError> {
    let storage = StorageBackend::from_config(config).await?;
    let state = build_state(config, storage).await?;
    Ok(create_router_with_state(config, state))
}

/// Build the relying party over `storage` and provision the seed users
pub async fn build_state(config: &Config, storage: StorageBackend) -> Result<AppState, KeygateError> {
    let rp_config = config.relying_party()?;
    tracing::info!(
        rp_id = %rp_config.rp_id,
        origin = %rp_config.origin,
        storage = storage.name(),
        "Relying party configured"
    );

    let store = storage.credential_store();
    let seeded = seed_users(store.as_ref(), &config.seed_users).await?;
    if seeded > 0 {
        tracing::info!("Provisioned {} seed user(s)", seeded);
    }

    Ok(AppState::new(RelyingParty::new(rp_config, store), storage))
}

/// Create the application router around an existing state
pub fn create_router_with_state(config: &Config, state: AppState) -> Router {
    // Configure CORS based on allowed_origins
    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS: Restricting to {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        }
        _ => {
            tracing::warn!("CORS: Allowing all origins (dev mode)");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    // Request body limit
    let body_limit = RequestBodyLimitLayer::new(config.body_limit_kb * 1024);

    // Request timeout
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    // Base router with common layers
    let router = Router::new()
        .route("/webauthn/register/start", post(start_registration))
        .route("/webauthn/register/finish", post(finish_registration))
        .route("/webauthn/authenticate/start", post(start_authentication))
        .route("/webauthn/authenticate/finish", post(finish_authentication))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
        .layer(body_limit)
        .layer(timeout);

    // Conditionally apply rate limiting (disabled in tests, enabled in production)
    let governor_conf = if config.rate_limit_enabled {
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_sec)
            .burst_size(config.rate_limit_burst)
            .finish()
    } else {
        None
    };

    match governor_conf {
        Some(governor_conf) => {
            tracing::info!(
                "Rate limiting: {} req/s (burst: {})",
                config.rate_limit_per_sec,
                config.rate_limit_burst
            );
            router
                .layer(GovernorLayer::new(Arc::new(governor_conf)))
                .layer(TraceLayer::new_for_http())
        }
        None => {
            if config.rate_limit_enabled {
                tracing::error!(
                    "Rate limiting: invalid settings ({} req/s, burst {}), DISABLED",
                    config.rate_limit_per_sec,
                    config.rate_limit_burst
                );
            } else {
                tracing::warn!("Rate limiting: DISABLED");
            }
            router.layer(TraceLayer::new_for_http())
        }
    }
}
