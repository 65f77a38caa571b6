//! Authenticator data decoding.
//!
//! Layout:
//!
//! ```text
//! rpIdHash[32] | flags[1] | signCount[4 BE]
//!   | aaguid[16] | credIdLen[2 BE] | credId[credIdLen] | COSE_Key   (AT flag)
//!   | extensions (CBOR map)                                        (ED flag)
//! ```

use serde::{Deserialize, Serialize};

use super::read_cbor_item;
use crate::error::Rejection;

const RP_ID_HASH_LEN: usize = 32;
const HEADER_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;

/// Upper bound on credential id length accepted from an authenticator.
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// Authenticator data flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorFlags {
    /// User present (UP)
    pub user_present: bool,
    /// User verified (UV)
    pub user_verified: bool,
    /// Backup eligible (BE) - credential may be synced across devices
    pub backup_eligible: bool,
    /// Backup state (BS) - credential is currently backed up
    pub backup_state: bool,
    /// Attested credential data present (AT)
    pub attested_credential_data: bool,
    /// Extension data present (ED)
    pub extension_data: bool,
}

impl AuthenticatorFlags {
    pub fn from_byte(flags: u8) -> Self {
        Self {
            user_present: (flags & 0x01) != 0,
            user_verified: (flags & 0x04) != 0,
            backup_eligible: (flags & 0x08) != 0,
            backup_state: (flags & 0x10) != 0,
            attested_credential_data: (flags & 0x40) != 0,
            extension_data: (flags & 0x80) != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut flags = 0u8;
        if self.user_present {
            flags |= 0x01;
        }
        if self.user_verified {
            flags |= 0x04;
        }
        if self.backup_eligible {
            flags |= 0x08;
        }
        if self.backup_state {
            flags |= 0x10;
        }
        if self.attested_credential_data {
            flags |= 0x40;
        }
        if self.extension_data {
            flags |= 0x80;
        }
        flags
    }
}

/// Fixed-length prefix of authenticator data (assertions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub counter: u32,
}

/// Authenticator data carrying attested credential data (registrations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub counter: u32,
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE_Key bytes, exactly one CBOR item
    pub public_key: Vec<u8>,
    /// Raw extension map, present only with the ED flag
    pub extensions: Option<Vec<u8>>,
}

fn decode_header(bytes: &[u8]) -> Option<AuthenticatorData> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
    let flags = AuthenticatorFlags::from_byte(bytes[RP_ID_HASH_LEN]);
    let counter = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);
    Some(AuthenticatorData {
        rp_id_hash,
        flags,
        counter,
    })
}

/// Decode the authenticator data returned with an assertion.
///
/// Trailing extension bytes are permitted and not interpreted.
pub fn decode_authenticator_data(bytes: &[u8]) -> Result<AuthenticatorData, Rejection> {
    decode_header(bytes).ok_or_else(|| {
        Rejection::MalformedAssertion(format!(
            "authenticator data is {} bytes, need at least {HEADER_LEN}",
            bytes.len()
        ))
    })
}

/// Decode authenticator data that must contain attested credential data.
pub fn decode_attested_credential(bytes: &[u8]) -> Result<AttestedCredential, Rejection> {
    let malformed = |reason: String| Rejection::MalformedAttestation(reason);

    let header = decode_header(bytes).ok_or_else(|| {
        malformed(format!(
            "authenticator data is {} bytes, need at least {HEADER_LEN}",
            bytes.len()
        ))
    })?;
    if !header.flags.attested_credential_data {
        return Err(malformed("attested credential data flag not set".into()));
    }

    let mut offset = HEADER_LEN;
    if bytes.len() < offset + AAGUID_LEN + 2 {
        return Err(malformed("truncated attested credential data".into()));
    }
    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[offset..offset + AAGUID_LEN]);
    offset += AAGUID_LEN;

    let id_len = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as usize;
    offset += 2;
    if id_len == 0 || id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(malformed(format!("credential id length {id_len} out of range")));
    }
    let remaining = bytes.len() - offset;
    if id_len > remaining {
        return Err(malformed(format!(
            "credential id length {id_len} exceeds remaining {remaining} bytes"
        )));
    }
    let credential_id = bytes[offset..offset + id_len].to_vec();
    offset += id_len;

    let (_, key_len) = read_cbor_item(&bytes[offset..])
        .map_err(|e| malformed(format!("credential public key: {e}")))?;
    let public_key = bytes[offset..offset + key_len].to_vec();
    offset += key_len;

    let trailing = &bytes[offset..];
    let extensions = if header.flags.extension_data {
        let (_, ext_len) =
            read_cbor_item(trailing).map_err(|e| malformed(format!("extensions: {e}")))?;
        if ext_len != trailing.len() {
            return Err(malformed("bytes trail the extension map".into()));
        }
        Some(trailing.to_vec())
    } else {
        if !trailing.is_empty() {
            return Err(malformed(format!(
                "{} unexpected bytes after credential public key",
                trailing.len()
            )));
        }
        None
    };

    Ok(AttestedCredential {
        rp_id_hash: header.rp_id_hash,
        flags: header.flags,
        counter: header.counter,
        aaguid,
        credential_id,
        public_key,
        extensions,
    })
}
