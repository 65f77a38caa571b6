//! Checks shared by the registration and authentication ceremonies.

use subtle::ConstantTimeEq;

use crate::codec::{decode_client_data, rp_id_hash, AuthenticatorFlags, ClientData, ClientDataType};
use crate::config::RelyingPartyConfig;
use crate::error::Rejection;
use crate::store::Challenge;

/// Decode client data and check type, challenge and origin, in that order.
pub(crate) fn verify_client_data(
    config: &RelyingPartyConfig,
    bytes: &[u8],
    expected: ClientDataType,
    challenge: &Challenge,
) -> Result<ClientData, Rejection> {
    let client_data = decode_client_data(bytes)?;

    if client_data.kind != expected {
        return Err(Rejection::ClientDataTypeMismatch {
            expected: expected.as_str(),
            actual: client_data.kind.as_str(),
        });
    }
    if !bool::from(client_data.challenge.as_slice().ct_eq(challenge.value.as_slice())) {
        return Err(Rejection::ChallengeMismatch);
    }
    if client_data.origin != config.origin {
        return Err(Rejection::OriginMismatch {
            expected: config.origin.clone(),
            actual: client_data.origin,
        });
    }
    Ok(client_data)
}

pub(crate) fn verify_rp_id_hash(
    config: &RelyingPartyConfig,
    reported: &[u8; 32],
) -> Result<(), Rejection> {
    let expected = rp_id_hash(&config.rp_id);
    if bool::from(expected.as_slice().ct_eq(reported.as_slice())) {
        Ok(())
    } else {
        Err(Rejection::RpIdMismatch)
    }
}

pub(crate) fn verify_user_flags(
    config: &RelyingPartyConfig,
    flags: &AuthenticatorFlags,
) -> Result<(), Rejection> {
    if !flags.user_present {
        return Err(Rejection::UserNotPresent);
    }
    if config.require_user_verification && !flags.user_verified {
        return Err(Rejection::UserNotVerified);
    }
    Ok(())
}

/// `authData || SHA-256(clientDataJSON)`
pub(crate) fn signed_data(auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let client_data_hash = crate::codec::sha256(client_data_json);
    let mut data = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    data.extend_from_slice(auth_data);
    data.extend_from_slice(&client_data_hash);
    data
}
