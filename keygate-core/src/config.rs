//! Relying Party configuration
//!
//! Identity of the relying party plus the verification policy applied by
//! both ceremonies.

use std::time::Duration;

use url::Url;

use crate::codec::CoseAlgorithm;
use crate::error::{KeygateError, Result};

/// Default options timeout handed to the client (60 s).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Relying Party configuration
#[derive(Debug, Clone)]
pub struct RelyingPartyConfig {
    /// Human-readable RP name shown by the authenticator
    pub rp_name: String,
    /// RP id (a registrable domain, e.g. "localhost")
    pub rp_id: String,
    /// Expected client data origin, in ASCII serialization
    pub origin: String,
    /// Credential algorithms accepted at registration, in preference order
    pub allowed_algorithms: Vec<CoseAlgorithm>,
    /// Reject ceremonies where the UV flag is clear
    pub require_user_verification: bool,
    /// Let `begin_authentication` return an empty allow list for users
    /// without credentials instead of failing
    pub allow_empty_allow_list: bool,
    /// Maximum challenge age; `None` disables expiry
    pub challenge_ttl: Option<Duration>,
    /// Ceremony timeout advertised in options
    pub timeout: Option<Duration>,
}

impl RelyingPartyConfig {
    /// Create a validated configuration with default policy.
    ///
    /// # Arguments
    ///
    /// * `rp_id` - Relying Party ID (typically the domain name)
    /// * `rp_name` - Human-readable name for the Relying Party
    /// * `origin` - Origin URL the browser reports in client data
    pub fn new(rp_id: &str, rp_name: &str, origin: &str) -> Result<Self> {
        let config = Self {
            rp_name: rp_name.to_string(),
            rp_id: rp_id.to_string(),
            origin: normalize_origin(origin)?,
            allowed_algorithms: CoseAlgorithm::ALL.to_vec(),
            require_user_verification: false,
            allow_empty_allow_list: false,
            challenge_ttl: None,
            timeout: Some(DEFAULT_TIMEOUT),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_allowed_algorithms(mut self, algorithms: Vec<CoseAlgorithm>) -> Result<Self> {
        self.allowed_algorithms = algorithms;
        self.validate()?;
        Ok(self)
    }

    pub fn with_user_verification_required(mut self, required: bool) -> Self {
        self.require_user_verification = required;
        self
    }

    pub fn with_empty_allow_list(mut self, allow: bool) -> Self {
        self.allow_empty_allow_list = allow;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check invariants that construction alone cannot guarantee.
    pub fn validate(&self) -> Result<()> {
        if self.rp_id.trim().is_empty() {
            return Err(KeygateError::Config("rp id must not be empty".into()));
        }
        if self.rp_id.contains("://") || self.rp_id.contains('/') {
            return Err(KeygateError::Config(format!(
                "rp id '{}' must be a bare domain",
                self.rp_id
            )));
        }
        if self.allowed_algorithms.is_empty() {
            return Err(KeygateError::Config(
                "at least one credential algorithm must be allowed".into(),
            ));
        }

        let origin = Url::parse(&self.origin)
            .map_err(|e| KeygateError::Config(format!("invalid origin URL: {e}")))?;
        let host = origin.host_str().unwrap_or_default();
        if host != self.rp_id && !host.ends_with(&format!(".{}", self.rp_id)) {
            return Err(KeygateError::Config(format!(
                "origin host '{host}' is not within rp id '{}'",
                self.rp_id
            )));
        }
        Ok(())
    }

    /// `userVerification` value advertised in options.
    pub fn user_verification(&self) -> &'static str {
        if self.require_user_verification {
            "required"
        } else {
            "preferred"
        }
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout.map(|t| t.as_millis() as u64)
    }
}

fn normalize_origin(origin: &str) -> Result<String> {
    let url =
        Url::parse(origin).map_err(|e| KeygateError::Config(format!("invalid origin URL: {e}")))?;
    let serialized = url.origin().ascii_serialization();
    if serialized == "null" {
        return Err(KeygateError::Config(format!(
            "origin '{origin}' has no tuple origin"
        )));
    }
    Ok(serialized)
}
