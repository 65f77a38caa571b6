//! `clientDataJSON` decoding.

use serde::Deserialize;

use super::decode_base64url;
use crate::error::Rejection;

/// Ceremony type asserted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    /// `webauthn.create`
    Registration,
    /// `webauthn.get`
    Authentication,
}

impl ClientDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "webauthn.create",
            Self::Authentication => "webauthn.get",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "webauthn.create" => Some(Self::Registration),
            "webauthn.get" => Some(Self::Authentication),
            _ => None,
        }
    }
}

/// Decoded client data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientData {
    pub kind: ClientDataType,
    /// Raw challenge bytes (base64url-decoded)
    pub challenge: Vec<u8>,
    pub origin: String,
}

#[derive(Deserialize)]
struct RawClientData {
    #[serde(rename = "type")]
    kind: String,
    challenge: String,
    origin: String,
}

/// Decode the UTF-8 JSON client data structure.
///
/// Unknown members (`crossOrigin`, `topOrigin`, `tokenBinding`) are ignored.
pub fn decode_client_data(bytes: &[u8]) -> Result<ClientData, Rejection> {
    let raw: RawClientData = serde_json::from_slice(bytes)
        .map_err(|e| Rejection::MalformedClientData(e.to_string()))?;

    let kind = ClientDataType::parse(&raw.kind).ok_or_else(|| {
        Rejection::MalformedClientData(format!("unknown client data type '{}'", raw.kind))
    })?;

    let challenge = decode_base64url(&raw.challenge)
        .map_err(|e| Rejection::MalformedClientData(format!("challenge encoding: {e}")))?;

    Ok(ClientData {
        kind,
        challenge,
        origin: raw.origin,
    })
}
