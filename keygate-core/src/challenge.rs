//! One-time challenge issuance and consumption.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Rejection, Result};
use crate::store::{Challenge, ChallengePurpose, CredentialStore};

/// Challenge length in bytes.
pub const CHALLENGE_LEN: usize = 32;

/// Mints challenges into the store's per-user slot and consumes them.
#[derive(Clone)]
pub struct ChallengeManager {
    store: Arc<dyn CredentialStore>,
    ttl: Option<Duration>,
}

impl ChallengeManager {
    pub fn new(store: Arc<dyn CredentialStore>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    /// Generate a fresh challenge for `(user_id, purpose)`.
    ///
    /// Any challenge already live for the user is overwritten.
    pub async fn issue(&self, user_id: &str, purpose: ChallengePurpose) -> Result<Challenge> {
        let mut value = vec![0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut value);

        let challenge = Challenge {
            value,
            user_id: user_id.to_string(),
            purpose,
            issued_at: Utc::now(),
        };
        self.store.set_challenge(challenge.clone()).await?;

        tracing::debug!(user_id = %user_id, purpose = purpose.as_str(), "Challenge issued");
        Ok(challenge)
    }

    /// Take the user's challenge for a ceremony.
    ///
    /// The slot is emptied whatever the outcome. A challenge issued for the
    /// other ceremony counts as missing.
    pub async fn consume(&self, user_id: &str, purpose: ChallengePurpose) -> Result<Challenge> {
        let challenge = self
            .store
            .take_challenge(user_id)
            .await?
            .ok_or(Rejection::MissingChallenge)?;

        if challenge.purpose != purpose {
            tracing::debug!(
                user_id = %user_id,
                expected = purpose.as_str(),
                actual = challenge.purpose.as_str(),
                "Discarding challenge issued for another ceremony"
            );
            return Err(Rejection::MissingChallenge.into());
        }

        if let Some(ttl) = self.ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) {
            if Utc::now() - challenge.issued_at > ttl {
                return Err(Rejection::ChallengeExpired.into());
            }
        }

        Ok(challenge)
    }
}
