//! COSE_Key public key descriptors.

use std::fmt;
use std::str::FromStr;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use super::{encode_cbor, map_get_int, read_cbor_item, value_as_i64, CborEncodeError};
use crate::error::Rejection;

// COSE_Key labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

/// Signature algorithms the engine can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoseAlgorithm {
    /// ECDSA over P-256 with SHA-256 (COSE -7)
    #[serde(rename = "ES256")]
    Es256,
    /// Ed25519 (COSE -8)
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl CoseAlgorithm {
    pub const ALL: [CoseAlgorithm; 2] = [CoseAlgorithm::Es256, CoseAlgorithm::EdDsa];

    /// COSE algorithm identifier.
    pub fn id(&self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::EdDsa => -8,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -8 => Some(Self::EdDsa),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::EdDsa => "EdDSA",
        }
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CoseAlgorithm {
    type Err = String;

    /// Accepts either the algorithm name or its COSE identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Self::from_id(id).ok_or_else(|| format!("unsupported COSE algorithm {id}"));
        }
        match s.to_ascii_lowercase().as_str() {
            "es256" => Ok(Self::Es256),
            "eddsa" | "ed25519" => Ok(Self::EdDsa),
            other => Err(format!("unknown algorithm '{other}'")),
        }
    }
}

/// A decoded public key.
///
/// `key_material` is the SEC1 uncompressed point (`0x04 || x || y`) for
/// ES256 and the 32-byte public key for EdDSA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyDescriptor {
    pub algorithm: CoseAlgorithm,
    pub key_material: Vec<u8>,
}

impl PublicKeyDescriptor {
    /// Encode as a COSE_Key CBOR map.
    pub fn to_cose_key(&self) -> Result<Vec<u8>, CborEncodeError> {
        let int = |n: i64| Value::Integer(n.into());
        let entries = match self.algorithm {
            CoseAlgorithm::Es256 => {
                let point = self.key_material.get(1..).unwrap_or_default();
                let (x, y) = point.split_at(point.len() / 2);
                vec![
                    (int(LABEL_KTY), int(KTY_EC2)),
                    (int(LABEL_ALG), int(self.algorithm.id())),
                    (int(LABEL_CRV), int(CRV_P256)),
                    (int(LABEL_X), Value::Bytes(x.to_vec())),
                    (int(LABEL_Y), Value::Bytes(y.to_vec())),
                ]
            }
            CoseAlgorithm::EdDsa => vec![
                (int(LABEL_KTY), int(KTY_OKP)),
                (int(LABEL_ALG), int(self.algorithm.id())),
                (int(LABEL_CRV), int(CRV_ED25519)),
                (int(LABEL_X), Value::Bytes(self.key_material.clone())),
            ],
        };

        encode_cbor(&Value::Map(entries))
    }
}

fn coordinate<'a>(
    entries: &'a [(Value, Value)],
    label: i64,
    name: &str,
) -> Result<&'a [u8], Rejection> {
    let bytes = map_get_int(entries, label)
        .and_then(Value::as_bytes)
        .ok_or_else(|| Rejection::MalformedAttestation(format!("COSE key missing {name}")))?;
    if bytes.len() != 32 {
        return Err(Rejection::MalformedAttestation(format!(
            "COSE key {name} is {} bytes, expected 32",
            bytes.len()
        )));
    }
    Ok(bytes.as_slice())
}

/// Parse a COSE_Key, rejecting algorithms outside `allowed`.
pub fn decode_public_key_descriptor(
    bytes: &[u8],
    allowed: &[CoseAlgorithm],
) -> Result<PublicKeyDescriptor, Rejection> {
    let malformed = |reason: &str| Rejection::MalformedAttestation(reason.to_string());

    let (value, used) = read_cbor_item(bytes).map_err(Rejection::MalformedAttestation)?;
    if used != bytes.len() {
        return Err(malformed("bytes trail the COSE key"));
    }
    let entries = value
        .as_map()
        .ok_or_else(|| malformed("COSE key is not a map"))?;

    let alg_id = map_get_int(entries, LABEL_ALG)
        .and_then(value_as_i64)
        .ok_or_else(|| malformed("COSE key missing alg"))?;
    let algorithm = CoseAlgorithm::from_id(alg_id)
        .filter(|alg| allowed.contains(alg))
        .ok_or(Rejection::UnsupportedAlgorithm(alg_id))?;

    let kty = map_get_int(entries, LABEL_KTY).and_then(value_as_i64);
    let crv = map_get_int(entries, LABEL_CRV).and_then(value_as_i64);

    let key_material = match algorithm {
        CoseAlgorithm::Es256 => {
            if kty != Some(KTY_EC2) || crv != Some(CRV_P256) {
                return Err(malformed("ES256 key must be EC2 on P-256"));
            }
            let x = coordinate(entries, LABEL_X, "x")?;
            let y = coordinate(entries, LABEL_Y, "y")?;
            let mut point = Vec::with_capacity(65);
            point.push(0x04);
            point.extend_from_slice(x);
            point.extend_from_slice(y);
            p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|_| malformed("ES256 key is not a point on P-256"))?;
            point
        }
        CoseAlgorithm::EdDsa => {
            if kty != Some(KTY_OKP) || crv != Some(CRV_ED25519) {
                return Err(malformed("EdDSA key must be OKP on Ed25519"));
            }
            let x = coordinate(entries, LABEL_X, "x")?;
            let bytes: [u8; 32] = x
                .try_into()
                .map_err(|_| malformed("EdDSA key must be 32 bytes"))?;
            ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                .map_err(|_| malformed("EdDSA key is not a point on Ed25519"))?;
            bytes.to_vec()
        }
    };

    Ok(PublicKeyDescriptor {
        algorithm,
        key_material,
    })
}
