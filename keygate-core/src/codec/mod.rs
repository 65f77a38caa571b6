//! Binary codec for WebAuthn ceremony payloads.
//!
//! Pure, stateless transforms between the transport encodings a browser
//! produces and the structures the ceremonies verify:
//!
//! - `client_data`: the `clientDataJSON` structure
//! - `authenticator_data`: the authenticator data blob, with or without
//!   attested credential data
//! - `attestation`: the CBOR attestation object envelope and statement checks
//! - `cose`: COSE_Key public key descriptors and the algorithm allow-list
//! - `signature`: signature verification over the signed-data buffer
//!
//! Every decoder treats its input as untrusted and fails with a
//! malformed-input [`Rejection`](crate::Rejection) rather than panicking.

mod attestation;
mod authenticator_data;
mod client_data;
mod cose;
mod signature;

pub use attestation::{
    decode_attestation_object, verify_attestation_statement, AttestationFormat, AttestationObject,
};
pub use authenticator_data::{
    decode_attested_credential, decode_authenticator_data, AttestedCredential, AuthenticatorData,
    AuthenticatorFlags, MAX_CREDENTIAL_ID_LEN,
};
pub use client_data::{decode_client_data, ClientData, ClientDataType};
pub use cose::{decode_public_key_descriptor, CoseAlgorithm, PublicKeyDescriptor};
pub use signature::verify_signature;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::Value;
use sha2::{Digest, Sha256};

/// SHA-256 digest of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of the relying party identifier, as embedded in authenticator data.
pub fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    sha256(rp_id.as_bytes())
}

/// Encode bytes as unpadded base64url.
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating trailing `=` padding.
pub fn decode_base64url(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(text.trim_end_matches('='))
}

/// Serde adapter for `Vec<u8>` fields carried as base64url strings.
pub mod base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64url(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode_base64url(&text).map_err(serde::de::Error::custom)
    }

    /// Same adapter for optional fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&super::super::encode_base64url(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) if !text.is_empty() => super::super::decode_base64url(&text)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

/// Failure serializing a CBOR value.
pub type CborEncodeError = ciborium::ser::Error<std::io::Error>;

/// Serialize a CBOR value into a fresh buffer.
pub fn encode_cbor(value: &Value) -> Result<Vec<u8>, CborEncodeError> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out)?;
    Ok(out)
}

/// Read exactly one CBOR data item from the front of `bytes`.
///
/// Returns the item and the number of bytes it occupied.
pub(crate) fn read_cbor_item(bytes: &[u8]) -> Result<(Value, usize), String> {
    let mut cursor = bytes;
    let value: Value =
        ciborium::from_reader(&mut cursor).map_err(|e| format!("invalid CBOR: {e:?}"))?;
    Ok((value, bytes.len() - cursor.len()))
}

/// Look up an integer label in a CBOR map.
pub(crate) fn map_get_int(entries: &[(Value, Value)], label: i64) -> Option<&Value> {
    entries
        .iter()
        .find(|(key, _)| key.as_integer().map(i128::from) == Some(i128::from(label)))
        .map(|(_, value)| value)
}

/// Look up a text label in a CBOR map.
pub(crate) fn map_get_text<'a>(entries: &'a [(Value, Value)], label: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(key, _)| key.as_text() == Some(label))
        .map(|(_, value)| value)
}

/// Interpret a CBOR value as a signed 64-bit integer.
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    value
        .as_integer()
        .and_then(|integer| i64::try_from(i128::from(integer)).ok())
}
