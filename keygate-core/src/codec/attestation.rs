//! Attestation object envelope and statement verification.

use ciborium::Value;

use super::cose::PublicKeyDescriptor;
use super::signature::verify_signature;
use super::{map_get_text, read_cbor_item, value_as_i64};
use crate::error::Rejection;

/// Decoded CBOR attestation object: `{fmt, attStmt, authData}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    pub auth_data: Vec<u8>,
}

/// Attestation statement kinds the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationFormat {
    /// `none`: no statement
    None,
    /// `packed` signed by the credential key itself
    PackedSelf,
}

impl AttestationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PackedSelf => "packed",
        }
    }
}

/// Decode the attestation object envelope.
pub fn decode_attestation_object(bytes: &[u8]) -> Result<AttestationObject, Rejection> {
    let malformed = |reason: &str| Rejection::MalformedAttestation(reason.to_string());

    let (value, used) = read_cbor_item(bytes).map_err(Rejection::MalformedAttestation)?;
    if used != bytes.len() {
        return Err(malformed("bytes trail the attestation object"));
    }
    let entries = value
        .into_map()
        .map_err(|_| malformed("attestation object is not a map"))?;

    let fmt = map_get_text(&entries, "fmt")
        .and_then(Value::as_text)
        .ok_or_else(|| malformed("attestation object missing fmt"))?
        .to_string();
    let att_stmt = map_get_text(&entries, "attStmt")
        .and_then(Value::as_map)
        .ok_or_else(|| malformed("attestation object missing attStmt"))?
        .clone();
    let auth_data = map_get_text(&entries, "authData")
        .and_then(Value::as_bytes)
        .ok_or_else(|| malformed("attestation object missing authData"))?
        .clone();

    Ok(AttestationObject {
        fmt,
        att_stmt,
        auth_data,
    })
}

/// Check the attestation statement against the newly attested key.
///
/// `none` must carry an empty statement. `packed` is accepted only as
/// self-attestation: no `x5c`, `alg` equal to the credential's algorithm,
/// and `sig` valid over `authData || clientDataHash` under the credential key.
pub fn verify_attestation_statement(
    attestation: &AttestationObject,
    client_data_hash: &[u8; 32],
    key: &PublicKeyDescriptor,
) -> Result<AttestationFormat, Rejection> {
    match attestation.fmt.as_str() {
        "none" => {
            if !attestation.att_stmt.is_empty() {
                return Err(Rejection::MalformedAttestation(
                    "none attestation carries a statement".into(),
                ));
            }
            Ok(AttestationFormat::None)
        }
        "packed" => {
            let stmt = &attestation.att_stmt;
            if map_get_text(stmt, "x5c").is_some() || map_get_text(stmt, "ecdaaKeyId").is_some() {
                return Err(Rejection::UnsupportedAttestationFormat(
                    "packed with certificate chain".into(),
                ));
            }
            let alg = map_get_text(stmt, "alg")
                .and_then(value_as_i64)
                .ok_or_else(|| {
                    Rejection::MalformedAttestation("packed statement missing alg".into())
                })?;
            if alg != key.algorithm.id() {
                return Err(Rejection::MalformedAttestation(format!(
                    "statement alg {alg} does not match credential alg {}",
                    key.algorithm.id()
                )));
            }
            let sig = map_get_text(stmt, "sig")
                .and_then(Value::as_bytes)
                .ok_or_else(|| {
                    Rejection::MalformedAttestation("packed statement missing sig".into())
                })?;

            let mut signed_data = Vec::with_capacity(attestation.auth_data.len() + 32);
            signed_data.extend_from_slice(&attestation.auth_data);
            signed_data.extend_from_slice(client_data_hash);
            if !verify_signature(key, &signed_data, sig) {
                return Err(Rejection::SignatureInvalid);
            }
            Ok(AttestationFormat::PackedSelf)
        }
        other => Err(Rejection::UnsupportedAttestationFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CoseAlgorithm;

    fn envelope(fmt: &str, stmt: Vec<(Value, Value)>, auth_data: &[u8]) -> Vec<u8> {
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(fmt.into())),
            (Value::Text("attStmt".into()), Value::Map(stmt)),
            (Value::Text("authData".into()), Value::Bytes(auth_data.to_vec())),
        ]);
        let mut out = Vec::new();
        ciborium::into_writer(&object, &mut out).unwrap();
        out
    }

    fn dummy_key() -> PublicKeyDescriptor {
        PublicKeyDescriptor {
            algorithm: CoseAlgorithm::EdDsa,
            key_material: vec![1; 32],
        }
    }

    #[test]
    fn test_decode_none_envelope() {
        let obj = decode_attestation_object(&envelope("none", vec![], &[1, 2, 3])).unwrap();
        assert_eq!(obj.fmt, "none");
        assert!(obj.att_stmt.is_empty());
        assert_eq!(obj.auth_data, vec![1, 2, 3]);
        assert_eq!(
            verify_attestation_statement(&obj, &[0; 32], &dummy_key()),
            Ok(AttestationFormat::None)
        );
    }

    #[test]
    fn test_missing_auth_data() {
        let object = Value::Map(vec![(Value::Text("fmt".into()), Value::Text("none".into()))]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&object, &mut bytes).unwrap();
        assert!(matches!(
            decode_attestation_object(&bytes),
            Err(Rejection::MalformedAttestation(_))
        ));
    }

    #[test]
    fn test_not_cbor() {
        assert!(matches!(
            decode_attestation_object(&[0xff]),
            Err(Rejection::MalformedAttestation(_))
        ));
        assert!(matches!(
            decode_attestation_object(&[]),
            Err(Rejection::MalformedAttestation(_))
        ));
    }

    #[test]
    fn test_unsupported_formats() {
        let obj = decode_attestation_object(&envelope("fido-u2f", vec![], &[0])).unwrap();
        assert_eq!(
            verify_attestation_statement(&obj, &[0; 32], &dummy_key()),
            Err(Rejection::UnsupportedAttestationFormat("fido-u2f".into()))
        );

        let stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-8).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![0; 64])),
            (Value::Text("x5c".into()), Value::Array(vec![Value::Bytes(vec![0x30])])),
        ];
        let obj = decode_attestation_object(&envelope("packed", stmt, &[0])).unwrap();
        assert!(matches!(
            verify_attestation_statement(&obj, &[0; 32], &dummy_key()),
            Err(Rejection::UnsupportedAttestationFormat(_))
        ));
    }

    #[test]
    fn test_none_with_statement_is_malformed() {
        let stmt = vec![(Value::Text("sig".into()), Value::Bytes(vec![0]))];
        let obj = decode_attestation_object(&envelope("none", stmt, &[0])).unwrap();
        assert!(matches!(
            verify_attestation_statement(&obj, &[0; 32], &dummy_key()),
            Err(Rejection::MalformedAttestation(_))
        ));
    }

    #[test]
    fn test_packed_alg_mismatch() {
        let stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-7).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![0; 64])),
        ];
        let obj = decode_attestation_object(&envelope("packed", stmt, &[0])).unwrap();
        assert!(matches!(
            verify_attestation_statement(&obj, &[0; 32], &dummy_key()),
            Err(Rejection::MalformedAttestation(_))
        ));
    }

    #[test]
    fn test_packed_bad_signature() {
        let stmt = vec![
            (Value::Text("alg".into()), Value::Integer((-8).into())),
            (Value::Text("sig".into()), Value::Bytes(vec![0; 64])),
        ];
        let obj = decode_attestation_object(&envelope("packed", stmt, &[0])).unwrap();
        assert_eq!(
            verify_attestation_statement(&obj, &[0; 32], &dummy_key()),
            Err(Rejection::SignatureInvalid)
        );
    }
}
