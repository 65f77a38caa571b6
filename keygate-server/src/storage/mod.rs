//! Credential storage selection
//!
//! - **PostgreSQL** when `DATABASE_URL` is set: users, authenticators and
//!   challenges survive restarts.
//! - **In-memory** otherwise (development only, everything is lost on restart).

mod postgres;

pub use postgres::PostgresCredentialStore;

use std::sync::Arc;

use keygate_core::{CredentialStore, KeygateError, MemoryStore, Rejection, User};

use crate::config::Config;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<StorageError> for KeygateError {
    fn from(err: StorageError) -> Self {
        KeygateError::Storage(err.to_string())
    }
}

/// Storage backend behind the relying party
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL storage (production)
    Postgres(PostgresCredentialStore),
    /// In-memory storage (development fallback)
    Memory(Arc<MemoryStore>),
}

impl StorageBackend {
    /// Create storage with PostgreSQL backend and apply migrations
    pub async fn with_postgres(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let store = PostgresCredentialStore::new(database_url, max_connections).await?;
        store.migrate().await?;
        Ok(Self::Postgres(store))
    }

    /// Create storage with in-memory backend (development only)
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(MemoryStore::new()))
    }

    /// Create storage from configuration
    ///
    /// Uses PostgreSQL if `database_url` is set, otherwise falls back to in-memory.
    pub async fn from_config(config: &Config) -> Result<Self, StorageError> {
        match &config.database_url {
            Some(url) => {
                tracing::info!("Using PostgreSQL credential storage");
                Self::with_postgres(url, config.database_max_connections).await
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, using in-memory storage - credentials will be lost on restart!"
                );
                Ok(Self::in_memory())
            }
        }
    }

    /// The store handed to the relying party
    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        match self {
            Self::Postgres(pg) => Arc::new(pg.clone()),
            Self::Memory(memory) => memory.clone(),
        }
    }

    /// Check if using persistent storage
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Postgres(_))
    }

    /// Backend label reported by the health endpoint
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres(pg) => pg.backend_name(),
            Self::Memory(memory) => memory.backend_name(),
        }
    }

    /// Check database health (always Ok for memory backend)
    pub async fn check_health(&self) -> Result<(), StorageError> {
        match self {
            Self::Postgres(pg) => pg.check_health().await,
            Self::Memory(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StorageBackend").field(&self.name()).finish()
    }
}

/// Provision `(id, username)` pairs, skipping ids that already exist.
///
/// Returns how many users were created.
pub async fn seed_users(
    store: &dyn CredentialStore,
    users: &[(String, String)],
) -> Result<usize, KeygateError> {
    let mut created = 0;
    for (id, username) in users {
        match store.insert_user(User::new(id.as_str(), username.as_str())).await {
            Ok(()) => {
                tracing::info!(user_id = %id, username = %username, "Seeded user");
                created += 1;
            }
            Err(KeygateError::Rejected(Rejection::DuplicateUser)) => {
                tracing::debug!(user_id = %id, "Seed user already present");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = StorageBackend::in_memory();
        assert!(!storage.is_persistent());
        assert_eq!(storage.name(), "memory");
        assert!(storage.check_health().await.is_ok());
    }

    #[tokio::test]
    async fn test_seed_users_is_idempotent() {
        let storage = StorageBackend::in_memory();
        let store = storage.credential_store();
        let users = vec![
            ("1234".to_string(), "Test".to_string()),
            ("2345".to_string(), "Test2".to_string()),
        ];

        assert_eq!(seed_users(store.as_ref(), &users).await.unwrap(), 2);
        assert_eq!(seed_users(store.as_ref(), &users).await.unwrap(), 0);
        assert_eq!(store.get("2345").await.unwrap().username, "Test2");
    }
}
