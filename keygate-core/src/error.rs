use thiserror::Error;

/// Taxonomy class of a ceremony rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionClass {
    /// User or credential absent
    NotFound,
    /// Challenge, origin, RP id or type mismatch (bug or active attack)
    ProtocolMismatch,
    /// Codec failure on untrusted input
    MalformedInput,
    /// Signature invalid or counter regression (possible cloned authenticator)
    Cryptographic,
}

impl RejectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::MalformedInput => "malformed_input",
            Self::Cryptographic => "cryptographic",
        }
    }
}

/// Reason a ceremony attempt was rejected.
///
/// Every rejection is terminal for the attempt. The challenge has already
/// been consumed by the time any verification rejection is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("user not found")]
    UserNotFound,

    #[error("user already exists")]
    DuplicateUser,

    #[error("no live challenge for this ceremony")]
    MissingChallenge,

    #[error("challenge expired")]
    ChallengeExpired,

    #[error("challenge does not match the issued challenge")]
    ChallengeMismatch,

    #[error("origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    #[error("relying party id hash mismatch")]
    RpIdMismatch,

    #[error("client data type mismatch: expected {expected}, got {actual}")]
    ClientDataTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("malformed client data: {0}")]
    MalformedClientData(String),

    #[error("malformed attestation: {0}")]
    MalformedAttestation(String),

    #[error("malformed assertion: {0}")]
    MalformedAssertion(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("unsupported attestation format: {0}")]
    UnsupportedAttestationFormat(String),

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification required but not performed")]
    UserNotVerified,

    #[error("user handle does not match")]
    UserHandleMismatch,

    #[error("credential is already registered")]
    DuplicateCredential,

    #[error("credential is not registered to this user")]
    UnknownCredential,

    #[error("user has no registered credentials")]
    NoCredentials,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("stale sign counter: stored {stored}, reported {reported}")]
    StaleCounter { stored: u32, reported: u32 },
}

impl Rejection {
    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::DuplicateUser => "DUPLICATE_USER",
            Self::MissingChallenge => "MISSING_CHALLENGE",
            Self::ChallengeExpired => "CHALLENGE_EXPIRED",
            Self::ChallengeMismatch => "CHALLENGE_MISMATCH",
            Self::OriginMismatch { .. } => "ORIGIN_MISMATCH",
            Self::RpIdMismatch => "RPID_MISMATCH",
            Self::ClientDataTypeMismatch { .. } => "CLIENT_DATA_TYPE_MISMATCH",
            Self::MalformedClientData(_) => "MALFORMED_CLIENT_DATA",
            Self::MalformedAttestation(_) => "MALFORMED_ATTESTATION",
            Self::MalformedAssertion(_) => "MALFORMED_ASSERTION",
            Self::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            Self::UnsupportedAttestationFormat(_) => "UNSUPPORTED_ATTESTATION_FORMAT",
            Self::UserNotPresent => "USER_NOT_PRESENT",
            Self::UserNotVerified => "USER_NOT_VERIFIED",
            Self::UserHandleMismatch => "USER_HANDLE_MISMATCH",
            Self::DuplicateCredential => "DUPLICATE_CREDENTIAL",
            Self::UnknownCredential => "UNKNOWN_CREDENTIAL",
            Self::NoCredentials => "NO_CREDENTIALS",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::StaleCounter { .. } => "STALE_COUNTER",
        }
    }

    pub fn class(&self) -> RejectionClass {
        match self {
            Self::UserNotFound
            | Self::DuplicateUser
            | Self::MissingChallenge
            | Self::UnknownCredential
            | Self::NoCredentials => RejectionClass::NotFound,

            Self::ChallengeExpired
            | Self::ChallengeMismatch
            | Self::OriginMismatch { .. }
            | Self::RpIdMismatch
            | Self::ClientDataTypeMismatch { .. }
            | Self::UserNotPresent
            | Self::UserNotVerified
            | Self::UserHandleMismatch
            | Self::DuplicateCredential => RejectionClass::ProtocolMismatch,

            Self::MalformedClientData(_)
            | Self::MalformedAttestation(_)
            | Self::MalformedAssertion(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::UnsupportedAttestationFormat(_) => RejectionClass::MalformedInput,

            Self::SignatureInvalid | Self::StaleCounter { .. } => RejectionClass::Cryptographic,
        }
    }
}

/// Top-level error type.
///
/// `Rejected` carries expected verification outcomes; the other variants are
/// reserved for faults in the store or the configuration.
#[derive(Error, Debug)]
pub enum KeygateError {
    #[error("ceremony rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl KeygateError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

pub type Result<T> = std::result::Result<T, KeygateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Rejection::MissingChallenge.code(), "MISSING_CHALLENGE");
        assert_eq!(
            Rejection::StaleCounter {
                stored: 5,
                reported: 4
            }
            .code(),
            "STALE_COUNTER"
        );
        assert_eq!(Rejection::RpIdMismatch.code(), "RPID_MISMATCH");
    }

    #[test]
    fn test_classes() {
        assert_eq!(
            Rejection::SignatureInvalid.class(),
            RejectionClass::Cryptographic
        );
        assert_eq!(
            Rejection::MalformedAttestation("short".into()).class(),
            RejectionClass::MalformedInput
        );
        assert_eq!(Rejection::UserNotFound.class(), RejectionClass::NotFound);
    }

    #[test]
    fn test_rejection_conversion() {
        let err: KeygateError = Rejection::UnknownCredential.into();
        assert!(err.is_rejection());
        assert_eq!(err.rejection(), Some(&Rejection::UnknownCredential));
        assert!(!KeygateError::Storage("down".into()).is_rejection());
    }
}
