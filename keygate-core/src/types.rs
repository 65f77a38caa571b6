//! Ceremony options and responses in the WebAuthn JSON shape.
//!
//! Binary members travel as unpadded base64url strings.

use serde::{Deserialize, Serialize};

use crate::codec::base64url;
use crate::store::{Authenticator, Transport};

/// The only credential type WebAuthn defines.
pub const PUBLIC_KEY_TYPE: &str = "public-key";

fn public_key_type() -> String {
    PUBLIC_KEY_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// User handle: the user id bytes
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub kind: String,
    pub alg: i64,
}

/// Reference to an existing credential (exclude / allow lists).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<Transport>,
}

impl From<&Authenticator> for CredentialDescriptor {
    fn from(authenticator: &Authenticator) -> Self {
        Self {
            kind: public_key_type(),
            id: authenticator.credential_id.clone(),
            transports: authenticator.transports.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: String,
    pub user_verification: String,
}

/// Options for `navigator.credentials.create()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: String,
}

/// Options for `navigator.credentials.get()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "base64url")]
    pub attestation_object: Vec<u8>,
    /// Raw transport hints; unrecognized values are dropped
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Result of `navigator.credentials.create()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    #[serde(with = "base64url")]
    pub raw_id: Vec<u8>,
    pub response: AuthenticatorAttestationResponse,
    #[serde(rename = "type", default = "public_key_type")]
    pub kind: String,
}

impl RegistrationResponse {
    /// Recognized transport hints, in the order given.
    pub fn transports(&self) -> Vec<Transport> {
        let mut transports: Vec<Transport> = Vec::new();
        for hint in &self.response.transports {
            if let Ok(transport) = hint.parse::<Transport>() {
                if !transports.contains(&transport) {
                    transports.push(transport);
                }
            }
        }
        transports
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "base64url")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "base64url")]
    pub signature: Vec<u8>,
    #[serde(
        default,
        with = "base64url::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_handle: Option<Vec<u8>>,
}

/// Result of `navigator.credentials.get()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    #[serde(with = "base64url")]
    pub raw_id: Vec<u8>,
    pub response: AuthenticatorAssertionResponse,
    #[serde(rename = "type", default = "public_key_type")]
    pub kind: String,
}

/// Successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub verified: bool,
    pub authenticator: Authenticator,
}

/// Successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOutcome {
    pub verified: bool,
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    pub new_counter: u32,
}
