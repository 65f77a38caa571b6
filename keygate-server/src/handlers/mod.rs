//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod webauthn;

pub use crate::state::AppState;
pub use health::{health, HealthResponse};
pub use webauthn::{
    finish_authentication, finish_registration, start_authentication, start_registration,
    FinishAuthenticationRequest, FinishRegistrationRequest, StartCeremonyRequest,
};
