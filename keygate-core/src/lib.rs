//! Keygate Core - WebAuthn relying-party ceremony engine
//!
//! This crate issues single-use challenges and verifies that an
//! authenticator holds the private key for a registered public key, without
//! ever handling secret key material.
//!
//! # Features
//!
//! - Registration (attestation) and authentication (assertion) ceremonies
//! - ES256 (P-256) and EdDSA (Ed25519) credentials
//! - `none` and `packed` self-attestation
//! - Anti-replay signature counter discipline
//! - Pluggable async [`CredentialStore`] with an in-memory adapter
//! - Per-user serialization of ceremony steps
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keygate_core::{MemoryStore, RelyingParty, RelyingPartyConfig, SoftAuthenticator};
//!
//! # async fn example() -> keygate_core::Result<()> {
//! let config = RelyingPartyConfig::new("localhost", "Keygate", "http://localhost:10001")?;
//! let store = Arc::new(MemoryStore::with_users([("1234", "Test")]));
//! let rp = RelyingParty::new(config, store);
//!
//! // Register a software authenticator
//! let mut authenticator = SoftAuthenticator::es256("localhost", "http://localhost:10001");
//! let options = rp.begin_registration("1234").await?;
//! let response = authenticator.register(&options).unwrap();
//! let outcome = rp.complete_registration("1234", &response).await?;
//! assert!(outcome.verified);
//!
//! // Log in with it
//! let options = rp.begin_authentication("1234").await?;
//! let response = authenticator.authenticate(&options);
//! let outcome = rp.complete_authentication("1234", &response).await?;
//! assert_eq!(outcome.new_counter, 1);
//! # Ok(())
//! # }
//! ```

mod authentication;
mod ceremony;
pub mod challenge;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
mod registration;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "soft-authenticator"))]
pub mod soft_authenticator;

// Re-export main types for convenience
pub use challenge::{ChallengeManager, CHALLENGE_LEN};
pub use codec::{CoseAlgorithm, PublicKeyDescriptor};
pub use config::RelyingPartyConfig;
pub use engine::RelyingParty;
pub use error::{KeygateError, Rejection, RejectionClass, Result};
pub use locks::UserLocks;
pub use store::{
    Authenticator, Challenge, ChallengePurpose, CredentialStore, DeviceType, MemoryStore,
    Transport, User, UserLease,
};
pub use types::{
    AuthenticationOptions, AuthenticationOutcome, AuthenticationResponse, RegistrationOptions,
    RegistrationOutcome, RegistrationResponse,
};

#[cfg(any(test, feature = "soft-authenticator"))]
pub use soft_authenticator::{SoftAttestation, SoftAuthenticator};
