//! PostgreSQL credential store
//!
//! Persists users, authenticators and the per-user challenge slot.
//!
//! User leases are transaction-scoped advisory locks taken on a second pool,
//! so a step holding one can still reach the data pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_core::{
    Authenticator, Challenge, ChallengePurpose, CoseAlgorithm, CredentialStore, DeviceType,
    KeygateError, Rejection, Transport, User, UserLease,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::StorageError;

/// Advisory lock class for user leases ("KG")
const USER_LOCK_CLASS: i32 = 0x4b47;

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
    /// Connections parked on `pg_advisory_xact_lock` for the length of a step
    lock_pool: PgPool,
}

/// Database row for users
#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
}

/// Database row for authenticators
#[derive(FromRow)]
struct AuthenticatorRow {
    credential_id: Vec<u8>,
    public_key: Vec<u8>,
    algorithm: i64,
    sign_counter: i64,
    device_type: String,
    backed_up: bool,
    transports: Vec<String>,
    aaguid: Vec<u8>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<AuthenticatorRow> for Authenticator {
    type Error = StorageError;

    fn try_from(row: AuthenticatorRow) -> Result<Self, Self::Error> {
        let algorithm = CoseAlgorithm::from_id(row.algorithm)
            .ok_or_else(|| StorageError::Corrupt(format!("algorithm {}", row.algorithm)))?;
        let sign_counter = u32::try_from(row.sign_counter)
            .map_err(|_| StorageError::Corrupt(format!("sign_counter {}", row.sign_counter)))?;
        let device_type = row
            .device_type
            .parse::<DeviceType>()
            .map_err(StorageError::Corrupt)?;
        let aaguid: [u8; 16] = row
            .aaguid
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::Corrupt(format!("aaguid of {} bytes", row.aaguid.len())))?;

        let transports = row
            .transports
            .iter()
            .filter_map(|t| match t.parse::<Transport>() {
                Ok(transport) => Some(transport),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping stored transport");
                    None
                }
            })
            .collect();

        Ok(Self {
            credential_id: row.credential_id,
            public_key: row.public_key,
            algorithm,
            sign_counter,
            device_type,
            backed_up: row.backed_up,
            transports,
            aaguid,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        })
    }
}

/// Database row for challenges
#[derive(FromRow)]
struct ChallengeRow {
    user_id: String,
    challenge: Vec<u8>,
    purpose: String,
    issued_at: DateTime<Utc>,
}

impl TryFrom<ChallengeRow> for Challenge {
    type Error = StorageError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            value: row.challenge,
            user_id: row.user_id,
            purpose: row
                .purpose
                .parse::<ChallengePurpose>()
                .map_err(StorageError::Corrupt)?,
            issued_at: row.issued_at,
        })
    }
}

fn query_error(e: sqlx::Error) -> KeygateError {
    StorageError::Query(e.to_string()).into()
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

impl PostgresCredentialStore {
    /// Create a new PostgreSQL credential store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let lock_pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::info!("Connected to PostgreSQL database");
        Ok(Self { pool, lock_pool })
    }

    /// Create from existing pools. `lock_pool` must not be `pool`.
    pub fn from_pools(pool: PgPool, lock_pool: PgPool) -> Self {
        Self { pool, lock_pool }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Check database connection health
    pub async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn insert_authenticator(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &str,
        authenticator: &Authenticator,
    ) -> Result<(), KeygateError> {
        let transports: Vec<String> = authenticator
            .transports
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO keygate_authenticators
                (credential_id, user_id, public_key, algorithm, sign_counter,
                 device_type, backed_up, transports, aaguid, created_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (credential_id) DO NOTHING
            "#,
        )
        .bind(&authenticator.credential_id)
        .bind(user_id)
        .bind(&authenticator.public_key)
        .bind(authenticator.algorithm.id())
        .bind(i64::from(authenticator.sign_counter))
        .bind(authenticator.device_type.as_str())
        .bind(authenticator.backed_up)
        .bind(&transports)
        .bind(authenticator.aaguid.as_slice())
        .bind(authenticator.created_at)
        .bind(authenticator.last_used_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                KeygateError::Rejected(Rejection::UserNotFound)
            } else {
                query_error(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(Rejection::DuplicateCredential.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn get(&self, user_id: &str) -> Result<User, KeygateError> {
        let user = sqlx::query_as::<_, UserRow>(
            "SELECT id, username FROM keygate_users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?
        .ok_or(Rejection::UserNotFound)?;

        let rows = sqlx::query_as::<_, AuthenticatorRow>(
            r#"
            SELECT credential_id, public_key, algorithm, sign_counter, device_type,
                   backed_up, transports, aaguid, created_at, last_used_at
            FROM keygate_authenticators
            WHERE user_id = $1
            ORDER BY created_at, credential_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let authenticators = rows
            .into_iter()
            .map(Authenticator::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(User {
            id: user.id,
            username: user.username,
            authenticators,
        })
    }

    async fn insert_user(&self, user: User) -> Result<(), KeygateError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO keygate_users (id, username)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(Rejection::DuplicateUser.into());
        }

        for authenticator in &user.authenticators {
            Self::insert_authenticator(&mut tx, &user.id, authenticator).await?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn add_authenticator(
        &self,
        user_id: &str,
        authenticator: Authenticator,
    ) -> Result<(), KeygateError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        Self::insert_authenticator(&mut tx, user_id, &authenticator).await?;
        tx.commit().await.map_err(query_error)?;

        tracing::debug!(user_id = %user_id, "Authenticator stored in database");
        Ok(())
    }

    async fn update_counter(
        &self,
        user_id: &str,
        credential_id: &[u8],
        new_counter: u32,
    ) -> Result<(), KeygateError> {
        // Compare-and-set: only ever raises the counter
        let result = sqlx::query(
            r#"
            UPDATE keygate_authenticators
            SET sign_counter = $3, last_used_at = NOW()
            WHERE user_id = $1 AND credential_id = $2 AND sign_counter < $3
            "#,
        )
        .bind(user_id)
        .bind(credential_id)
        .bind(i64::from(new_counter))
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let stored: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT sign_counter FROM keygate_authenticators
            WHERE user_id = $1 AND credential_id = $2
            "#,
        )
        .bind(user_id)
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        match stored {
            Some(stored) => Err(Rejection::StaleCounter {
                stored: u32::try_from(stored).unwrap_or(u32::MAX),
                reported: new_counter,
            }
            .into()),
            None => Err(Rejection::UnknownCredential.into()),
        }
    }

    async fn set_challenge(&self, challenge: Challenge) -> Result<(), KeygateError> {
        sqlx::query(
            r#"
            INSERT INTO keygate_challenges (user_id, challenge, purpose, issued_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                challenge = EXCLUDED.challenge,
                purpose = EXCLUDED.purpose,
                issued_at = EXCLUDED.issued_at
            "#,
        )
        .bind(&challenge.user_id)
        .bind(&challenge.value)
        .bind(challenge.purpose.as_str())
        .bind(challenge.issued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                KeygateError::Rejected(Rejection::UserNotFound)
            } else {
                query_error(e)
            }
        })?;
        Ok(())
    }

    async fn take_challenge(&self, user_id: &str) -> Result<Option<Challenge>, KeygateError> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            r#"
            DELETE FROM keygate_challenges
            WHERE user_id = $1
            RETURNING user_id, challenge, purpose, issued_at
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.map(Challenge::try_from).transpose()?)
    }

    async fn find_credential_owner(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<String>, KeygateError> {
        sqlx::query_scalar("SELECT user_id FROM keygate_authenticators WHERE credential_id = $1")
            .bind(credential_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)
    }

    async fn lock_user(&self, user_id: &str) -> Result<UserLease, KeygateError> {
        let mut tx = self
            .lock_pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Released when the transaction ends, including on drop
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
            .bind(USER_LOCK_CLASS)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        Ok(UserLease::new(tx))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

impl std::fmt::Debug for PostgresCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCredentialStore")
            .field("pool", &"<PgPool>")
            .field("lock_pool", &"<PgPool>")
            .finish()
    }
}
