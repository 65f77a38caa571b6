//! Credential storage
//!
//! The [`CredentialStore`] trait is the only seam between the ceremonies and
//! persistence. It holds:
//! - **Users** and their registered authenticators
//! - **Challenges**: one slot per user, overwritten on issue, erased on take
//!
//! [`MemoryStore`] is the in-process adapter. Database adapters live with the
//! transport that owns the connection pool.
//!
//! Adapters also own the per-user lock ([`CredentialStore::lock_user`]), so
//! every engine sharing a store serializes on the same key.

mod memory;

pub use memory::MemoryStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{base64url, CoseAlgorithm};
use crate::error::Result;

/// Whether a credential is bound to one device or may be synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    SingleDevice,
    MultiDevice,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleDevice => "singleDevice",
            Self::MultiDevice => "multiDevice",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "singleDevice" => Ok(Self::SingleDevice),
            "multiDevice" => Ok(Self::MultiDevice),
            other => Err(format!("unknown device type '{other}'")),
        }
    }
}

/// Authenticator transport hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Usb,
    Ble,
    Nfc,
    Internal,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Ble => "ble",
            Self::Nfc => "nfc",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Self::Usb),
            "ble" => Ok(Self::Ble),
            "nfc" => Ok(Self::Nfc),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// A registered credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticator {
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    /// COSE_Key bytes as attested
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>,
    pub algorithm: CoseAlgorithm,
    pub sign_counter: u32,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<Transport>,
    #[serde(with = "aaguid_format")]
    pub aaguid: [u8; 16],
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A user record with its credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub authenticators: Vec<Authenticator>,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            authenticators: Vec::new(),
        }
    }

    /// Look up one of this user's credentials.
    pub fn authenticator(&self, credential_id: &[u8]) -> Option<&Authenticator> {
        self.authenticators
            .iter()
            .find(|a| a.credential_id == credential_id)
    }
}

/// Ceremony a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengePurpose {
    Registration,
    Authentication,
}

impl ChallengePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authentication => "authentication",
        }
    }
}

impl FromStr for ChallengePurpose {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "authentication" => Ok(Self::Authentication),
            other => Err(format!("unknown challenge purpose '{other}'")),
        }
    }
}

/// A one-time challenge bound to a user and a ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub value: Vec<u8>,
    pub user_id: String,
    pub purpose: ChallengePurpose,
    pub issued_at: DateTime<Utc>,
}

/// Exclusive hold on one user's ceremony state, released on drop.
pub struct UserLease {
    _held: Box<dyn Send>,
}

impl UserLease {
    /// Wrap whatever guard releases the lock when dropped.
    pub fn new<G: Send + 'static>(guard: G) -> Self {
        Self {
            _held: Box::new(guard),
        }
    }
}

impl fmt::Debug for UserLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserLease")
    }
}

/// Persistence contract used by the ceremonies.
///
/// Adapters report absent users as `Rejection::UserNotFound`, and all
/// non-rejection failures as `KeygateError::Storage`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load a user with all of its authenticators.
    async fn get(&self, user_id: &str) -> Result<User>;

    /// Provision a user. Fails with `DuplicateUser` if the id exists.
    async fn insert_user(&self, user: User) -> Result<()>;

    /// Attach a new authenticator.
    ///
    /// Fails with `DuplicateCredential` if the credential id is registered
    /// to any user.
    async fn add_authenticator(&self, user_id: &str, authenticator: Authenticator) -> Result<()>;

    /// Raise a credential's signature counter.
    ///
    /// Fails with `StaleCounter` unless `new_counter` is strictly greater
    /// than the stored value, and `UnknownCredential` if the user does not
    /// own the credential.
    async fn update_counter(
        &self,
        user_id: &str,
        credential_id: &[u8],
        new_counter: u32,
    ) -> Result<()>;

    /// Store a challenge in its user's slot, replacing any previous one.
    async fn set_challenge(&self, challenge: Challenge) -> Result<()>;

    /// Remove and return the user's challenge in one step.
    async fn take_challenge(&self, user_id: &str) -> Result<Option<Challenge>>;

    /// Which user, if any, owns this credential id.
    async fn find_credential_owner(&self, credential_id: &[u8]) -> Result<Option<String>>;

    /// Wait for exclusive access to `user_id` across every holder of this store.
    ///
    /// The ceremony step runs while the returned lease is alive.
    async fn lock_user(&self, user_id: &str) -> Result<UserLease>;

    /// Short backend label for health reporting.
    fn backend_name(&self) -> &'static str;
}

/// AAGUIDs serialize in their canonical UUID text form.
pub mod aaguid_format {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn to_string(aaguid: &[u8; 16]) -> String {
        let hex = hex::encode(aaguid);
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }

    pub fn parse(text: &str) -> Result<[u8; 16], String> {
        let compact: String = text.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&compact).map_err(|e| e.to_string())?;
        <[u8; 16]>::try_from(bytes.as_slice()).map_err(|_| format!("invalid AAGUID '{text}'"))
    }

    pub fn serialize<S: Serializer>(aaguid: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_string(aaguid))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 16], D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aaguid_text_form() {
        let mut aaguid = [0u8; 16];
        aaguid[0] = 0xad;
        aaguid[15] = 0x01;
        let text = aaguid_format::to_string(&aaguid);
        assert_eq!(text, "ad000000-0000-0000-0000-000000000001");
        assert_eq!(aaguid_format::parse(&text).unwrap(), aaguid);
        assert!(aaguid_format::parse("ad00").is_err());
    }

    #[test]
    fn test_transport_parse() {
        assert_eq!("internal".parse::<Transport>().unwrap(), Transport::Internal);
        assert!("hybrid".parse::<Transport>().is_err());
    }

    #[test]
    fn test_authenticator_json_shape() {
        let authenticator = Authenticator {
            credential_id: vec![1, 2, 3],
            public_key: vec![0xa1],
            algorithm: CoseAlgorithm::Es256,
            sign_counter: 0,
            device_type: DeviceType::MultiDevice,
            backed_up: true,
            transports: vec![Transport::Internal],
            aaguid: [0; 16],
            created_at: Utc::now(),
            last_used_at: None,
        };
        let json = serde_json::to_value(&authenticator).unwrap();
        assert_eq!(json["credentialId"], "AQID");
        assert_eq!(json["algorithm"], "ES256");
        assert_eq!(json["deviceType"], "multiDevice");
        assert_eq!(json["transports"][0], "internal");
        assert_eq!(json["aaguid"], "00000000-0000-0000-0000-000000000000");
    }
}
