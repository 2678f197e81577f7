//! Postgres Session Store
//!
//! [`SessionStore`] implementation over a sqlx connection pool, for
//! deployments where several instances share one token database.
//!
//! # Atomicity
//!
//! The compare-and-swap contract rides on Postgres row locking: the
//! `UPDATE ... WHERE revoked = FALSE` touches zero rows for every caller
//! except the one that wins, and `rows_affected` reports which one that was.
//! No explicit transaction is needed for the single-row flip.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::postgres::PgSessionStore;
//!
//! let pool = sqlx::PgPool::connect(&database_url).await?;
//! portcullis::postgres::migrate(&pool).await?;
//! let store = PgSessionStore::new(pool);
//! ```

use std::future::Future;
use std::pin::Pin;

use sqlx::PgPool;

use crate::store::{NewRecord, RefreshRecord, SessionStore, StoreError};

/// Schema for the token table.
///
/// `token_hash` is a SHA-256 hex digest, hence CHAR(64); the unique
/// constraint backs [`StoreError::UniqueViolation`]. Family and subject
/// indexes cover the two revocation cascades.
pub const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS refresh_tokens (
    id           BIGSERIAL PRIMARY KEY,
    subject_id   TEXT NOT NULL,
    token_hash   CHAR(64) NOT NULL UNIQUE,
    family_id    TEXT NOT NULL,
    revoked      BOOLEAN NOT NULL DEFAULT FALSE,
    expires_at   BIGINT NOT NULL,
    created_at   BIGINT NOT NULL,
    last_used_at BIGINT
);
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_family ON refresh_tokens (family_id);
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_subject ON refresh_tokens (subject_id);
";

/// Create the token table and its indexes if they do not exist.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
    }
    Ok(())
}

/// Postgres-backed [`SessionStore`].
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

/// Row shape shared by the queries below
type TokenRow = (i64, String, String, String, bool, i64, i64, Option<i64>);

impl PgSessionStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: TokenRow) -> RefreshRecord {
        let (id, subject_id, token_hash, family_id, revoked, expires_at, created_at, last_used_at) =
            row;
        RefreshRecord {
            id: id.to_string(),
            subject_id,
            // CHAR(64) comes back space-padded if anything shorter ever lands
            token_hash: token_hash.trim_end().to_string(),
            family_id,
            revoked,
            expires_at,
            created_at,
            last_used_at,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

impl SessionStore for PgSessionStore {
    fn insert(
        &self,
        record: NewRecord,
    ) -> Pin<Box<dyn Future<Output = Result<RefreshRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let now = crate::claims::unix_now();
            let row: TokenRow = sqlx::query_as(
                "INSERT INTO refresh_tokens \
                     (subject_id, token_hash, family_id, revoked, expires_at, created_at) \
                 VALUES ($1, $2, $3, FALSE, $4, $5) \
                 RETURNING id, subject_id, token_hash, family_id, revoked, \
                           expires_at, created_at, last_used_at",
            )
            .bind(&record.subject_id)
            .bind(&record.token_hash)
            .bind(&record.family_id)
            .bind(record.expires_at)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::UniqueViolation
                } else {
                    StoreError::Backend(e.to_string())
                }
            })?;

            Ok(Self::record_from_row(row))
        })
    }

    fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RefreshRecord>, StoreError>> + Send + '_>> {
        let token_hash = token_hash.to_string();
        Box::pin(async move {
            let row: Option<TokenRow> = sqlx::query_as(
                "SELECT id, subject_id, token_hash, family_id, revoked, \
                        expires_at, created_at, last_used_at \
                 FROM refresh_tokens WHERE token_hash = $1",
            )
            .bind(&token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

            Ok(row.map(Self::record_from_row))
        })
    }

    fn compare_and_swap_revoke(
        &self,
        id: &str,
        last_used_at: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let id: i64 = match id.parse() {
                Ok(id) => id,
                Err(_) => return Ok(false),
            };

            let result = sqlx::query(
                "UPDATE refresh_tokens \
                 SET revoked = TRUE, last_used_at = COALESCE($2, last_used_at) \
                 WHERE id = $1 AND revoked = FALSE",
            )
            .bind(id)
            .bind(last_used_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn revoke_by_family(
        &self,
        family_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        let family_id = family_id.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE refresh_tokens SET revoked = TRUE \
                 WHERE family_id = $1 AND revoked = FALSE",
            )
            .bind(&family_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

            Ok(result.rows_affected())
        })
    }

    fn revoke_by_subject(
        &self,
        subject_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        let subject_id = subject_id.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE refresh_tokens SET revoked = TRUE \
                 WHERE subject_id = $1 AND revoked = FALSE",
            )
            .bind(&subject_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

            Ok(result.rows_affected())
        })
    }
}
