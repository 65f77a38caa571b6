//! Authentication ceremony: request options and assertion verification.

use crate::ceremony::{signed_data, verify_client_data, verify_rp_id_hash, verify_user_flags};
use crate::challenge::ChallengeManager;
use crate::codec::{
    decode_authenticator_data, decode_base64url, decode_public_key_descriptor, verify_signature,
    ClientDataType,
};
use crate::config::RelyingPartyConfig;
use crate::error::{KeygateError, Rejection, Result};
use crate::store::{ChallengePurpose, CredentialStore};
use crate::types::{
    AuthenticationOptions, AuthenticationOutcome, AuthenticationResponse, CredentialDescriptor,
};

pub(crate) async fn begin(
    config: &RelyingPartyConfig,
    store: &dyn CredentialStore,
    challenges: &ChallengeManager,
    user_id: &str,
) -> Result<AuthenticationOptions> {
    let user = store.get(user_id).await?;
    if user.authenticators.is_empty() && !config.allow_empty_allow_list {
        return Err(Rejection::NoCredentials.into());
    }

    let challenge = challenges
        .issue(user_id, ChallengePurpose::Authentication)
        .await?;

    Ok(AuthenticationOptions {
        challenge: challenge.value,
        timeout: config.timeout_ms(),
        rp_id: config.rp_id.clone(),
        allow_credentials: user
            .authenticators
            .iter()
            .map(CredentialDescriptor::from)
            .collect(),
        user_verification: config.user_verification().to_string(),
    })
}

pub(crate) async fn complete(
    config: &RelyingPartyConfig,
    store: &dyn CredentialStore,
    challenges: &ChallengeManager,
    user_id: &str,
    response: &AuthenticationResponse,
) -> Result<AuthenticationOutcome> {
    let challenge = challenges
        .consume(user_id, ChallengePurpose::Authentication)
        .await?;

    let user = store.get(user_id).await?;
    let credential_id = response.raw_id.as_slice();
    let stored = user
        .authenticator(credential_id)
        .ok_or(Rejection::UnknownCredential)?;
    if decode_base64url(&response.id).ok().as_deref() != Some(credential_id) {
        return Err(Rejection::MalformedAssertion("id does not match rawId".into()).into());
    }

    let assertion = &response.response;
    verify_client_data(
        config,
        &assertion.client_data_json,
        ClientDataType::Authentication,
        &challenge,
    )?;

    let auth_data = decode_authenticator_data(&assertion.authenticator_data)?;
    verify_rp_id_hash(config, &auth_data.rp_id_hash)?;
    verify_user_flags(config, &auth_data.flags)?;

    // A stored key that no longer decodes is a store fault, not a client error
    let key = decode_public_key_descriptor(&stored.public_key, &[stored.algorithm])
        .map_err(|e| KeygateError::Storage(format!("stored public key unreadable: {e}")))?;
    let signed = signed_data(&assertion.authenticator_data, &assertion.client_data_json);
    if !verify_signature(&key, &signed, &assertion.signature) {
        return Err(Rejection::SignatureInvalid.into());
    }

    if let Some(handle) = &assertion.user_handle {
        if handle.as_slice() != user.id.as_bytes() {
            return Err(Rejection::UserHandleMismatch.into());
        }
    }

    let stored_counter = stored.sign_counter;
    let reported = auth_data.counter;
    if stored_counter != 0 && reported <= stored_counter {
        return Err(Rejection::StaleCounter {
            stored: stored_counter,
            reported,
        }
        .into());
    }

    if reported > stored_counter {
        store
            .update_counter(user_id, credential_id, reported)
            .await?;
    } else {
        tracing::debug!(
            user_id = %user_id,
            "Authenticator reports no signature counter; skipping counter update"
        );
    }

    tracing::info!(user_id = %user_id, new_counter = reported, "Assertion verified");

    Ok(AuthenticationOutcome {
        verified: true,
        credential_id: credential_id.to_vec(),
        new_counter: reported.max(stored_counter),
    })
}
