//! Keygate Server Library - HTTP API for WebAuthn registration and authentication
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use error::ApiError;
pub use routes::{build_state, create_router, create_router_with_config, create_router_with_state};
pub use state::AppState;
pub use storage::{seed_users, PostgresCredentialStore, StorageBackend, StorageError};
