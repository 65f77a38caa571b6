//! Software authenticator
//!
//! Holds a real key pair and produces genuine attestation and assertion
//! responses, so ceremonies can be exercised end to end without a browser.
//! Every field of the produced responses is public and may be tampered with
//! before submission.

use ciborium::Value;
use ed25519_dalek::Signer as _;
use p256::ecdsa::signature::Signer as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::codec::{
    encode_base64url, encode_cbor, rp_id_hash, sha256, CborEncodeError, CoseAlgorithm,
    PublicKeyDescriptor,
};
use crate::store::Transport;
use crate::types::{
    AuthenticationOptions, AuthenticationResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, RegistrationOptions, RegistrationResponse, PUBLIC_KEY_TYPE,
};

const FLAG_UP: u8 = 0x01;
const FLAG_UV: u8 = 0x04;
const FLAG_BE: u8 = 0x08;
const FLAG_BS: u8 = 0x10;
const FLAG_AT: u8 = 0x40;

enum SigningKey {
    Es256(p256::ecdsa::SigningKey),
    EdDsa(ed25519_dalek::SigningKey),
}

/// Attestation statement the authenticator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftAttestation {
    None,
    PackedSelf,
}

/// In-process authenticator with one credential.
pub struct SoftAuthenticator {
    key: SigningKey,
    credential_id: Vec<u8>,
    aaguid: [u8; 16],
    rp_id: String,
    origin: String,
    counter: u32,
    counter_step: u32,
    user_verified: bool,
    backup_eligible: bool,
    backup_state: bool,
    attestation: SoftAttestation,
    transports: Vec<Transport>,
    user_handle: Option<Vec<u8>>,
}

impl SoftAuthenticator {
    /// New ES256 authenticator for `rp_id`, reporting `origin` in client data.
    pub fn es256(rp_id: &str, origin: &str) -> Self {
        Self::with_key(
            SigningKey::Es256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            rp_id,
            origin,
        )
    }

    /// New EdDSA (Ed25519) authenticator.
    pub fn eddsa(rp_id: &str, origin: &str) -> Self {
        Self::with_key(
            SigningKey::EdDsa(ed25519_dalek::SigningKey::generate(&mut OsRng)),
            rp_id,
            origin,
        )
    }

    fn with_key(key: SigningKey, rp_id: &str, origin: &str) -> Self {
        let mut credential_id = vec![0u8; 32];
        OsRng.fill_bytes(&mut credential_id);
        Self {
            key,
            credential_id,
            aaguid: [0u8; 16],
            rp_id: rp_id.to_string(),
            origin: origin.to_string(),
            counter: 0,
            counter_step: 1,
            user_verified: true,
            backup_eligible: false,
            backup_state: false,
            attestation: SoftAttestation::None,
            transports: vec![Transport::Internal],
            user_handle: None,
        }
    }

    pub fn with_credential_id(mut self, credential_id: Vec<u8>) -> Self {
        self.credential_id = credential_id;
        self
    }

    pub fn with_aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = aaguid;
        self
    }

    /// Counter increment per assertion. `0` models an authenticator without
    /// a signature counter.
    pub fn with_counter_step(mut self, step: u32) -> Self {
        self.counter_step = step;
        self
    }

    pub fn with_user_verification(mut self, verified: bool) -> Self {
        self.user_verified = verified;
        self
    }

    pub fn with_backup(mut self, eligible: bool, backed_up: bool) -> Self {
        self.backup_eligible = eligible;
        self.backup_state = backed_up;
        self
    }

    pub fn with_attestation(mut self, attestation: SoftAttestation) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Force the next reported counter base.
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    pub fn public_key(&self) -> PublicKeyDescriptor {
        match &self.key {
            SigningKey::Es256(key) => PublicKeyDescriptor {
                algorithm: CoseAlgorithm::Es256,
                key_material: key
                    .verifying_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec(),
            },
            SigningKey::EdDsa(key) => PublicKeyDescriptor {
                algorithm: CoseAlgorithm::EdDsa,
                key_material: key.verifying_key().to_bytes().to_vec(),
            },
        }
    }

    /// Sign arbitrary data with the credential key, in the algorithm's
    /// WebAuthn signature encoding.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        match &self.key {
            SigningKey::Es256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(data);
                signature.to_der().as_bytes().to_vec()
            }
            SigningKey::EdDsa(key) => key.sign(data).to_bytes().to_vec(),
        }
    }

    /// `clientDataJSON` as a browser would produce it.
    pub fn client_data(&self, kind: &str, challenge: &[u8]) -> Vec<u8> {
        let json = serde_json::json!({
            "type": kind,
            "challenge": encode_base64url(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        });
        json.to_string().into_bytes()
    }

    fn flags(&self) -> u8 {
        let mut flags = FLAG_UP;
        if self.user_verified {
            flags |= FLAG_UV;
        }
        if self.backup_eligible {
            flags |= FLAG_BE;
        }
        if self.backup_state {
            flags |= FLAG_BS;
        }
        flags
    }

    /// Authenticator data with attested credential data.
    pub fn attested_auth_data(&self) -> Result<Vec<u8>, CborEncodeError> {
        let cose_key = self.public_key().to_cose_key()?;
        let mut data = Vec::with_capacity(37 + 18 + self.credential_id.len() + cose_key.len());
        data.extend_from_slice(&rp_id_hash(&self.rp_id));
        data.push(self.flags() | FLAG_AT);
        data.extend_from_slice(&self.counter.to_be_bytes());
        data.extend_from_slice(&self.aaguid);
        data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.credential_id);
        data.extend_from_slice(&cose_key);
        Ok(data)
    }

    /// Assertion authenticator data for the current counter.
    pub fn assertion_auth_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&rp_id_hash(&self.rp_id));
        data.push(self.flags());
        data.extend_from_slice(&self.counter.to_be_bytes());
        data
    }

    /// Respond to creation options.
    pub fn register(
        &mut self,
        options: &RegistrationOptions,
    ) -> Result<RegistrationResponse, CborEncodeError> {
        self.user_handle = Some(options.user.id.clone());
        self.attest(&options.challenge)
    }

    /// Produce an attestation response over an arbitrary challenge.
    pub fn attest(&self, challenge: &[u8]) -> Result<RegistrationResponse, CborEncodeError> {
        let client_data_json = self.client_data("webauthn.create", challenge);
        let auth_data = self.attested_auth_data()?;

        let att_stmt = match self.attestation {
            SoftAttestation::None => Vec::new(),
            SoftAttestation::PackedSelf => {
                let mut signed = auth_data.clone();
                signed.extend_from_slice(&sha256(&client_data_json));
                vec![
                    (
                        Value::Text("alg".into()),
                        Value::Integer(self.public_key().algorithm.id().into()),
                    ),
                    (Value::Text("sig".into()), Value::Bytes(self.sign(&signed))),
                ]
            }
        };
        let fmt = match self.attestation {
            SoftAttestation::None => "none",
            SoftAttestation::PackedSelf => "packed",
        };
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(fmt.into())),
            (Value::Text("attStmt".into()), Value::Map(att_stmt)),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let attestation_object = encode_cbor(&object)?;

        Ok(RegistrationResponse {
            id: encode_base64url(&self.credential_id),
            raw_id: self.credential_id.clone(),
            response: AuthenticatorAttestationResponse {
                client_data_json,
                attestation_object,
                transports: self.transports.iter().map(|t| t.to_string()).collect(),
            },
            kind: PUBLIC_KEY_TYPE.to_string(),
        })
    }

    /// Respond to request options, advancing the counter.
    pub fn authenticate(&mut self, options: &AuthenticationOptions) -> AuthenticationResponse {
        self.counter = self.counter.wrapping_add(self.counter_step);
        self.assert_challenge(&options.challenge)
    }

    /// Produce an assertion over an arbitrary challenge at the current counter.
    pub fn assert_challenge(&self, challenge: &[u8]) -> AuthenticationResponse {
        let client_data_json = self.client_data("webauthn.get", challenge);
        let authenticator_data = self.assertion_auth_data();

        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));
        let signature = self.sign(&signed);

        AuthenticationResponse {
            id: encode_base64url(&self.credential_id),
            raw_id: self.credential_id.clone(),
            response: AuthenticatorAssertionResponse {
                client_data_json,
                authenticator_data,
                signature,
                user_handle: self.user_handle.clone(),
            },
            kind: PUBLIC_KEY_TYPE.to_string(),
        }
    }
}

impl std::fmt::Debug for SoftAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftAuthenticator")
            .field("algorithm", &self.public_key().algorithm)
            .field("credential_id", &encode_base64url(&self.credential_id))
            .field("counter", &self.counter)
            .finish()
    }
}
