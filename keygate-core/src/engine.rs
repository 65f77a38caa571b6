//! The relying party: ceremony entry points.

use std::sync::Arc;

use crate::challenge::ChallengeManager;
use crate::config::RelyingPartyConfig;
use crate::error::{KeygateError, RejectionClass, Result};
use crate::locks::UserLocks;
use crate::store::CredentialStore;
use crate::types::{
    AuthenticationOptions, AuthenticationOutcome, AuthenticationResponse, RegistrationOptions,
    RegistrationOutcome, RegistrationResponse,
};
use crate::{authentication, registration};

/// Ceremony engine bound to one relying party configuration and store.
///
/// Operations for the same user id run one at a time; different users
/// proceed concurrently. Each step first queues on an in-process lock, then
/// holds the store's user lease, which is what serializes engines in other
/// processes sharing the same database.
#[derive(Clone)]
pub struct RelyingParty {
    config: Arc<RelyingPartyConfig>,
    store: Arc<dyn CredentialStore>,
    challenges: ChallengeManager,
    locks: UserLocks,
}

impl RelyingParty {
    pub fn new(config: RelyingPartyConfig, store: Arc<dyn CredentialStore>) -> Self {
        let challenges = ChallengeManager::new(store.clone(), config.challenge_ttl);
        Self {
            config: Arc::new(config),
            store,
            challenges,
            locks: UserLocks::new(),
        }
    }

    pub fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Build creation options for `user_id` and mint a registration challenge.
    pub async fn begin_registration(&self, user_id: &str) -> Result<RegistrationOptions> {
        let _guard = self.locks.lock(user_id).await;
        let result = async {
            let _lease = self.store.lock_user(user_id).await?;
            registration::begin(&self.config, self.store.as_ref(), &self.challenges, user_id)
                .await
        }
        .await;
        log_outcome("begin_registration", user_id, &result);
        result
    }

    /// Verify an attestation and store the new authenticator.
    pub async fn complete_registration(
        &self,
        user_id: &str,
        response: &RegistrationResponse,
    ) -> Result<RegistrationOutcome> {
        let _guard = self.locks.lock(user_id).await;
        let result = async {
            let _lease = self.store.lock_user(user_id).await?;
            registration::complete(
                &self.config,
                self.store.as_ref(),
                &self.challenges,
                user_id,
                response,
            )
            .await
        }
        .await;
        log_outcome("complete_registration", user_id, &result);
        result
    }

    /// Build request options for `user_id` and mint an authentication challenge.
    pub async fn begin_authentication(&self, user_id: &str) -> Result<AuthenticationOptions> {
        let _guard = self.locks.lock(user_id).await;
        let result = async {
            let _lease = self.store.lock_user(user_id).await?;
            authentication::begin(&self.config, self.store.as_ref(), &self.challenges, user_id)
                .await
        }
        .await;
        log_outcome("begin_authentication", user_id, &result);
        result
    }

    /// Verify an assertion and advance the stored counter.
    pub async fn complete_authentication(
        &self,
        user_id: &str,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticationOutcome> {
        let _guard = self.locks.lock(user_id).await;
        let result = async {
            let _lease = self.store.lock_user(user_id).await?;
            authentication::complete(
                &self.config,
                self.store.as_ref(),
                &self.challenges,
                user_id,
                response,
            )
            .await
        }
        .await;
        log_outcome("complete_authentication", user_id, &result);
        result
    }
}

impl std::fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingParty")
            .field("rp_id", &self.config.rp_id)
            .field("origin", &self.config.origin)
            .field("store", &self.store.backend_name())
            .finish()
    }
}

fn log_outcome<T>(operation: &'static str, user_id: &str, result: &Result<T>) {
    match result {
        Ok(_) => tracing::debug!(operation, user_id = %user_id, "Ceremony step succeeded"),
        Err(KeygateError::Rejected(reason)) => {
            let class = reason.class();
            if class == RejectionClass::Cryptographic {
                tracing::warn!(
                    operation,
                    user_id = %user_id,
                    code = reason.code(),
                    class = class.as_str(),
                    clone_signal = true,
                    "Ceremony rejected: {}",
                    reason
                );
            } else {
                tracing::warn!(
                    operation,
                    user_id = %user_id,
                    code = reason.code(),
                    class = class.as_str(),
                    "Ceremony rejected: {}",
                    reason
                );
            }
        }
        Err(e) => tracing::error!(operation, user_id = %user_id, error = %e, "Ceremony failed"),
    }
}
