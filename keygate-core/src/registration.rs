//! Registration ceremony: creation options and attestation verification.

use chrono::Utc;

use crate::ceremony::{verify_client_data, verify_rp_id_hash, verify_user_flags};
use crate::challenge::ChallengeManager;
use crate::codec::{
    decode_attestation_object, decode_attested_credential, decode_base64url,
    decode_public_key_descriptor, sha256, verify_attestation_statement, ClientDataType,
};
use crate::config::RelyingPartyConfig;
use crate::error::{Rejection, Result};
use crate::store::{Authenticator, ChallengePurpose, CredentialStore, DeviceType};
use crate::types::{
    AuthenticatorSelection, CredentialDescriptor, PubKeyCredParam, RegistrationOptions,
    RegistrationOutcome, RegistrationResponse, RelyingPartyEntity, UserEntity, PUBLIC_KEY_TYPE,
};

pub(crate) async fn begin(
    config: &RelyingPartyConfig,
    store: &dyn CredentialStore,
    challenges: &ChallengeManager,
    user_id: &str,
) -> Result<RegistrationOptions> {
    let user = store.get(user_id).await?;
    let challenge = challenges
        .issue(user_id, ChallengePurpose::Registration)
        .await?;

    Ok(RegistrationOptions {
        rp: RelyingPartyEntity {
            id: config.rp_id.clone(),
            name: config.rp_name.clone(),
        },
        user: UserEntity {
            id: user.id.as_bytes().to_vec(),
            name: user.username.clone(),
            display_name: user.username.clone(),
        },
        challenge: challenge.value,
        pub_key_cred_params: config
            .allowed_algorithms
            .iter()
            .map(|alg| PubKeyCredParam {
                kind: PUBLIC_KEY_TYPE.to_string(),
                alg: alg.id(),
            })
            .collect(),
        timeout: config.timeout_ms(),
        exclude_credentials: user
            .authenticators
            .iter()
            .map(CredentialDescriptor::from)
            .collect(),
        authenticator_selection: AuthenticatorSelection {
            resident_key: "preferred".to_string(),
            user_verification: config.user_verification().to_string(),
        },
        attestation: "none".to_string(),
    })
}

pub(crate) async fn complete(
    config: &RelyingPartyConfig,
    store: &dyn CredentialStore,
    challenges: &ChallengeManager,
    user_id: &str,
    response: &RegistrationResponse,
) -> Result<RegistrationOutcome> {
    let challenge = challenges
        .consume(user_id, ChallengePurpose::Registration)
        .await?;

    let client_data_json = &response.response.client_data_json;
    verify_client_data(
        config,
        client_data_json,
        ClientDataType::Registration,
        &challenge,
    )?;

    let attestation = decode_attestation_object(&response.response.attestation_object)?;
    let attested = decode_attested_credential(&attestation.auth_data)?;
    verify_rp_id_hash(config, &attested.rp_id_hash)?;
    verify_user_flags(config, &attested.flags)?;

    let key = decode_public_key_descriptor(&attested.public_key, &config.allowed_algorithms)?;
    let format = verify_attestation_statement(&attestation, &sha256(client_data_json), &key)?;

    let id_matches = decode_base64url(&response.id)
        .map(|id| id == attested.credential_id)
        .unwrap_or(false);
    if response.raw_id != attested.credential_id || !id_matches {
        return Err(Rejection::MalformedAttestation(
            "response id does not match the attested credential id".into(),
        )
        .into());
    }

    let authenticator = Authenticator {
        credential_id: attested.credential_id,
        public_key: attested.public_key,
        algorithm: key.algorithm,
        sign_counter: attested.counter,
        device_type: if attested.flags.backup_eligible {
            DeviceType::MultiDevice
        } else {
            DeviceType::SingleDevice
        },
        backed_up: attested.flags.backup_state,
        transports: response.transports(),
        aaguid: attested.aaguid,
        created_at: Utc::now(),
        last_used_at: None,
    };
    store
        .add_authenticator(user_id, authenticator.clone())
        .await?;

    tracing::info!(
        user_id = %user_id,
        algorithm = %authenticator.algorithm,
        attestation_format = format.as_str(),
        device_type = authenticator.device_type.as_str(),
        "Credential registered"
    );

    Ok(RegistrationOutcome {
        verified: true,
        authenticator,
    })
}
