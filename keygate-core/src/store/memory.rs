//! In-memory credential store
//!
//! Thread-safe storage for users, credentials and challenge slots. Contents
//! are lost when the process exits.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Authenticator, Challenge, CredentialStore, User, UserLease};
use crate::error::{Rejection, Result};
use crate::locks::UserLocks;

/// DashMap-backed [`CredentialStore`].
#[derive(Default)]
pub struct MemoryStore {
    /// user_id -> user
    users: DashMap<String, User>,
    /// credential_id -> user_id, for global uniqueness
    credential_index: DashMap<Vec<u8>, String>,
    /// user_id -> live challenge
    challenges: DashMap<String, Challenge>,
    locks: UserLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `(id, username)` pairs.
    pub fn with_users<I, K, V>(users: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (id, username) in users {
            let user = User::new(id, username);
            store.users.insert(user.id.clone(), user);
        }
        store
    }

    /// Get statistics for monitoring
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            users: self.users.len(),
            credentials: self.credential_index.len(),
            challenges: self.challenges.len(),
        }
    }
}

/// Store statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub users: usize,
    pub credentials: usize,
    pub challenges: usize,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("MemoryStore")
            .field("users", &stats.users)
            .field("credentials", &stats.credentials)
            .field("challenges", &stats.challenges)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<User> {
        self.users
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Rejection::UserNotFound.into())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        // Lock order: users, then credential_index
        let slot = match self.users.entry(user.id.clone()) {
            Entry::Occupied(_) => return Err(Rejection::DuplicateUser.into()),
            Entry::Vacant(slot) => slot,
        };

        let mut indexed: Vec<&[u8]> = Vec::with_capacity(user.authenticators.len());
        let mut clash = false;
        for authenticator in &user.authenticators {
            match self
                .credential_index
                .entry(authenticator.credential_id.clone())
            {
                Entry::Vacant(index) => {
                    index.insert(user.id.clone());
                    indexed.push(&authenticator.credential_id);
                }
                Entry::Occupied(_) => {
                    clash = true;
                    break;
                }
            }
        }

        if clash {
            // Shard guard from the clashing entry is released by now
            for credential_id in indexed {
                self.credential_index.remove(credential_id);
            }
            return Err(Rejection::DuplicateCredential.into());
        }
        slot.insert(user);
        Ok(())
    }

    async fn add_authenticator(&self, user_id: &str, authenticator: Authenticator) -> Result<()> {
        // Lock order: users, then credential_index
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or(Rejection::UserNotFound)?;

        match self
            .credential_index
            .entry(authenticator.credential_id.clone())
        {
            Entry::Occupied(_) => Err(Rejection::DuplicateCredential.into()),
            Entry::Vacant(slot) => {
                slot.insert(user_id.to_string());
                user.authenticators.push(authenticator);
                Ok(())
            }
        }
    }

    async fn update_counter(
        &self,
        user_id: &str,
        credential_id: &[u8],
        new_counter: u32,
    ) -> Result<()> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or(Rejection::UnknownCredential)?;
        let authenticator = user
            .authenticators
            .iter_mut()
            .find(|a| a.credential_id == credential_id)
            .ok_or(Rejection::UnknownCredential)?;

        if new_counter <= authenticator.sign_counter {
            return Err(Rejection::StaleCounter {
                stored: authenticator.sign_counter,
                reported: new_counter,
            }
            .into());
        }
        authenticator.sign_counter = new_counter;
        authenticator.last_used_at = Some(Utc::now());
        Ok(())
    }

    async fn set_challenge(&self, challenge: Challenge) -> Result<()> {
        self.challenges.insert(challenge.user_id.clone(), challenge);
        Ok(())
    }

    async fn take_challenge(&self, user_id: &str) -> Result<Option<Challenge>> {
        Ok(self.challenges.remove(user_id).map(|(_, challenge)| challenge))
    }

    async fn find_credential_owner(&self, credential_id: &[u8]) -> Result<Option<String>> {
        Ok(self
            .credential_index
            .get(credential_id)
            .map(|entry| entry.value().clone()))
    }

    async fn lock_user(&self, user_id: &str) -> Result<UserLease> {
        Ok(UserLease::new(self.locks.lock(user_id).await))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CoseAlgorithm;
    use crate::error::KeygateError;
    use crate::store::{ChallengePurpose, DeviceType};
    use std::time::Duration;

    fn authenticator(id: &[u8], counter: u32) -> Authenticator {
        Authenticator {
            credential_id: id.to_vec(),
            public_key: vec![0xa0],
            algorithm: CoseAlgorithm::Es256,
            sign_counter: counter,
            device_type: DeviceType::SingleDevice,
            backed_up: false,
            transports: vec![],
            aaguid: [0; 16],
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    fn rejection(result: Result<()>) -> Rejection {
        match result {
            Err(KeygateError::Rejected(reason)) => reason,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let store = MemoryStore::new();
        let err = store.get("nobody").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::UserNotFound));
    }

    #[tokio::test]
    async fn test_duplicate_user() {
        let store = MemoryStore::with_users([("1234", "Test")]);
        assert_eq!(
            rejection(store.insert_user(User::new("1234", "Other")).await),
            Rejection::DuplicateUser
        );
        store.insert_user(User::new("2345", "Test2")).await.unwrap();
        assert_eq!(store.stats().users, 2);
    }

    #[tokio::test]
    async fn test_credential_id_unique_across_users() {
        let store = MemoryStore::with_users([("a", "A"), ("b", "B")]);
        store
            .add_authenticator("a", authenticator(&[7; 16], 0))
            .await
            .unwrap();
        assert_eq!(
            rejection(store.add_authenticator("b", authenticator(&[7; 16], 0)).await),
            Rejection::DuplicateCredential
        );
        assert!(store.get("b").await.unwrap().authenticators.is_empty());
        assert_eq!(
            store.find_credential_owner(&[7; 16]).await.unwrap(),
            Some("a".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_counter_monotonic() {
        let store = MemoryStore::with_users([("a", "A")]);
        store
            .add_authenticator("a", authenticator(&[1], 5))
            .await
            .unwrap();

        assert_eq!(
            rejection(store.update_counter("a", &[1], 5).await),
            Rejection::StaleCounter {
                stored: 5,
                reported: 5
            }
        );
        store.update_counter("a", &[1], 6).await.unwrap();

        let user = store.get("a").await.unwrap();
        let stored = user.authenticator(&[1]).unwrap();
        assert_eq!(stored.sign_counter, 6);
        assert!(stored.last_used_at.is_some());

        assert_eq!(
            rejection(store.update_counter("a", &[2], 9).await),
            Rejection::UnknownCredential
        );
    }

    #[tokio::test]
    async fn test_challenge_slot_is_single_and_destructive() {
        let store = MemoryStore::with_users([("a", "A")]);
        for (value, purpose) in [
            (vec![1u8; 32], ChallengePurpose::Registration),
            (vec![2u8; 32], ChallengePurpose::Authentication),
        ] {
            store
                .set_challenge(Challenge {
                    value,
                    user_id: "a".into(),
                    purpose,
                    issued_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let taken = store.take_challenge("a").await.unwrap().unwrap();
        assert_eq!(taken.value, vec![2u8; 32]);
        assert_eq!(taken.purpose, ChallengePurpose::Authentication);
        assert!(store.take_challenge("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_user_with_taken_credential_leaves_nothing_behind() {
        let store = MemoryStore::with_users([("a", "A")]);
        store
            .add_authenticator("a", authenticator(&[9; 16], 0))
            .await
            .unwrap();

        let mut user = User::new("b", "B");
        user.authenticators.push(authenticator(&[1; 16], 0));
        user.authenticators.push(authenticator(&[9; 16], 0));
        assert_eq!(
            rejection(store.insert_user(user).await),
            Rejection::DuplicateCredential
        );

        assert_eq!(
            store.get("b").await.unwrap_err().rejection(),
            Some(&Rejection::UserNotFound)
        );
        assert_eq!(store.find_credential_owner(&[1; 16]).await.unwrap(), None);
        assert_eq!(
            store.find_credential_owner(&[9; 16]).await.unwrap(),
            Some("a".to_string())
        );
        assert_eq!(store.stats().credentials, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_share_no_credential() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for id in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut user = User::new(format!("user-{id}"), "U");
                user.authenticators.push(authenticator(&[5; 16], 0));
                store.insert_user(user).await.is_ok()
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.stats().users, 1);
        let owner = store.find_credential_owner(&[5; 16]).await.unwrap().unwrap();
        assert_eq!(store.get(&owner).await.unwrap().authenticators.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_user_is_exclusive_per_user() {
        let store = MemoryStore::with_users([("a", "A"), ("b", "B")]);
        let lease = store.lock_user("a").await.unwrap();

        let wait = Duration::from_millis(50);
        assert!(tokio::time::timeout(wait, store.lock_user("a")).await.is_err());
        assert!(tokio::time::timeout(wait, store.lock_user("b")).await.is_ok());

        drop(lease);
        assert!(tokio::time::timeout(wait, store.lock_user("a")).await.is_ok());
    }
}
