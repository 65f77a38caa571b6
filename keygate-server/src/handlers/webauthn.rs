//! WebAuthn ceremony handlers
//!
//! Thin JSON wrappers over the relying party: every verification decision is
//! made by the engine, these handlers only parse and map errors.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use keygate_core::{
    AuthenticationOptions, AuthenticationOutcome, AuthenticationResponse, RegistrationOptions,
    RegistrationOutcome, RegistrationResponse,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::validate_user_id;

/// Body of both `start` endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCeremonyRequest {
    pub user_id: String,
}

/// Body of `POST /webauthn/register/finish`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRegistrationRequest {
    pub user_id: String,
    pub response: RegistrationResponse,
}

/// Body of `POST /webauthn/authenticate/finish`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishAuthenticationRequest {
    pub user_id: String,
    pub response: AuthenticationResponse,
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(req)| req)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e.body_text())))
}

/// POST /webauthn/register/start
///
/// Returns credential creation options with a fresh challenge.
pub async fn start_registration(
    State(state): State<AppState>,
    body: Result<Json<StartCeremonyRequest>, JsonRejection>,
) -> Result<Json<RegistrationOptions>, ApiError> {
    let req = parse_body(body)?;
    validate_user_id(&req.user_id)?;

    let options = state.relying_party.begin_registration(&req.user_id).await?;
    Ok(Json(options))
}

/// POST /webauthn/register/finish
///
/// Verifies the attestation and stores the new authenticator.
pub async fn finish_registration(
    State(state): State<AppState>,
    body: Result<Json<FinishRegistrationRequest>, JsonRejection>,
) -> Result<Json<RegistrationOutcome>, ApiError> {
    let req = parse_body(body)?;
    validate_user_id(&req.user_id)?;

    let outcome = state
        .relying_party
        .complete_registration(&req.user_id, &req.response)
        .await?;

    tracing::info!(user_id = %req.user_id, "WebAuthn registration completed");
    Ok(Json(outcome))
}

/// POST /webauthn/authenticate/start
///
/// Returns credential request options listing the user's credentials.
pub async fn start_authentication(
    State(state): State<AppState>,
    body: Result<Json<StartCeremonyRequest>, JsonRejection>,
) -> Result<Json<AuthenticationOptions>, ApiError> {
    let req = parse_body(body)?;
    validate_user_id(&req.user_id)?;

    let options = state
        .relying_party
        .begin_authentication(&req.user_id)
        .await?;
    Ok(Json(options))
}

/// POST /webauthn/authenticate/finish
///
/// Verifies the assertion and advances the signature counter.
pub async fn finish_authentication(
    State(state): State<AppState>,
    body: Result<Json<FinishAuthenticationRequest>, JsonRejection>,
) -> Result<Json<AuthenticationOutcome>, ApiError> {
    let req = parse_body(body)?;
    validate_user_id(&req.user_id)?;

    let outcome = state
        .relying_party
        .complete_authentication(&req.user_id, &req.response)
        .await?;

    tracing::info!(
        user_id = %req.user_id,
        new_counter = outcome.new_counter,
        "WebAuthn authentication completed"
    );
    Ok(Json(outcome))
}
