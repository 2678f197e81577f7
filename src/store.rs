//! Session Store
//!
//! Persistence contract for refresh-token records, plus an in-process
//! reference implementation.
//!
//! # Design Philosophy
//!
//! The rotation engine never touches storage directly: it receives a
//! [`SessionStore`] value (dependency injection, never a process-wide
//! singleton) and relies on three guarantees the store must uphold:
//!
//! 1. `token_hash` is unique across all records: a colliding insert fails
//!    with [`StoreError::UniqueViolation`] rather than silently overwriting.
//! 2. [`SessionStore::compare_and_swap_revoke`] flips `revoked` from `false`
//!    to `true` atomically and reports whether *this* caller made the flip.
//!    Two racing calls on the same record see exactly one `true`.
//! 3. `revoked` is monotonic: nothing ever sets it back to `false`.
//!
//! # Storage Note
//!
//! [`MemoryStore`] is suitable for tests and single-instance deployments.
//! For shared storage, enable the `postgres` feature or implement the trait
//! against your own backend.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::claims::unix_now;

// ============================================================================
// Record Model
// ============================================================================

/// A persisted refresh-token record.
///
/// One record per minted refresh token. `family_id` groups every token ever
/// issued along one rotation chain: one login creates one family, and every
/// rotation within that session inherits it. `id`, `subject_id`, `family_id`,
/// `token_hash`, `expires_at`, and `created_at` are immutable after insert;
/// only `revoked` (false to true, once) and `last_used_at` ever change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    /// Store-assigned opaque identifier
    pub id: String,
    /// The authenticated principal this token belongs to
    pub subject_id: String,
    /// SHA-256 hex digest of the token's opaque string; unique
    pub token_hash: String,
    /// Rotation-chain identifier, shared by every record in the chain
    pub family_id: String,
    /// Whether this record has been revoked (monotonic)
    pub revoked: bool,
    /// Absolute expiry, Unix seconds
    pub expires_at: i64,
    /// Insertion time, Unix seconds
    pub created_at: i64,
    /// Set when this record was consumed by a successful rotation
    pub last_used_at: Option<i64>,
}

/// Fields the caller supplies for a new record; the store assigns `id`,
/// `created_at`, and starts `revoked` at `false`.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// The authenticated principal
    pub subject_id: String,
    /// SHA-256 hex digest of the refresh token
    pub token_hash: String,
    /// Family inherited from the predecessor, or fresh on login
    pub family_id: String,
    /// Absolute expiry, Unix seconds
    pub expires_at: i64,
}

// ============================================================================
// Store Contract
// ============================================================================

/// Store operation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Insert collided with an existing `token_hash`
    UniqueViolation,
    /// Backend failure (connection, query, serialization)
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueViolation => write!(f, "token hash already exists"),
            Self::Backend(msg) => write!(f, "store backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Trait for refresh-token persistence backends.
///
/// Implement this to back the rotation engine with your storage (Postgres,
/// Redis, etc.). All mutations must be atomic at the record level; see the
/// module docs for the guarantees the engine depends on.
pub trait SessionStore: Send + Sync {
    /// Insert a new record, returning it with store-assigned fields.
    fn insert(
        &self,
        record: NewRecord,
    ) -> Pin<Box<dyn Future<Output = Result<RefreshRecord, StoreError>> + Send + '_>>;

    /// Look up a record by token digest.
    fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RefreshRecord>, StoreError>> + Send + '_>>;

    /// Atomically revoke a record if (and only if) it is not yet revoked.
    ///
    /// Returns `true` if this caller performed the flip, `false` if the
    /// record was already revoked or does not exist. When `last_used_at` is
    /// `Some`, it is written together with the flip.
    fn compare_and_swap_revoke(
        &self,
        id: &str,
        last_used_at: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>>;

    /// Revoke every record in a family. Returns the number of records
    /// newly revoked; revoking an empty or fully-revoked family is not an
    /// error.
    fn revoke_by_family(
        &self,
        family_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>>;

    /// Revoke every record belonging to a subject, across all families.
    fn revoke_by_subject(
        &self,
        subject_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>>;
}

// ============================================================================
// In-Memory Reference Implementation
// ============================================================================

/// In-process [`SessionStore`] backed by a mutex-guarded map.
///
/// Every operation holds the lock for its full duration, which makes the
/// compare-and-swap trivially atomic. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// Records keyed by store-assigned id
    records: HashMap<String, RefreshRecord>,
    /// token_hash -> id, enforcing hash uniqueness
    by_hash: HashMap<String, String>,
    next_id: u64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every record in a family, for inspection in tests and
    /// administrative tooling.
    pub fn family_records(&self, family_id: &str) -> Vec<RefreshRecord> {
        self.lock()
            .records
            .values()
            .filter(|r| r.family_id == family_id)
            .cloned()
            .collect()
    }

    // A poisoned lock still guards consistent data: every mutation below
    // completes before any early return.
    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn insert(
        &self,
        record: NewRecord,
    ) -> Pin<Box<dyn Future<Output = Result<RefreshRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.by_hash.contains_key(&record.token_hash) {
                return Err(StoreError::UniqueViolation);
            }

            inner.next_id += 1;
            let id = format!("rt-{}", inner.next_id);

            let stored = RefreshRecord {
                id: id.clone(),
                subject_id: record.subject_id,
                token_hash: record.token_hash.clone(),
                family_id: record.family_id,
                revoked: false,
                expires_at: record.expires_at,
                created_at: unix_now(),
                last_used_at: None,
            };

            inner.by_hash.insert(record.token_hash, id.clone());
            inner.records.insert(id, stored.clone());
            Ok(stored)
        })
    }

    fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RefreshRecord>, StoreError>> + Send + '_>> {
        let token_hash = token_hash.to_string();
        Box::pin(async move {
            let inner = self.lock();
            let id = match inner.by_hash.get(&token_hash) {
                Some(id) => id,
                None => return Ok(None),
            };
            Ok(inner.records.get(id).cloned())
        })
    }

    fn compare_and_swap_revoke(
        &self,
        id: &str,
        last_used_at: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            match inner.records.get_mut(&id) {
                Some(record) if !record.revoked => {
                    record.revoked = true;
                    if last_used_at.is_some() {
                        record.last_used_at = last_used_at;
                    }
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn revoke_by_family(
        &self,
        family_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        let family_id = family_id.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            let mut count = 0;
            for record in inner.records.values_mut() {
                if record.family_id == family_id && !record.revoked {
                    record.revoked = true;
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    fn revoke_by_subject(
        &self,
        subject_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        let subject_id = subject_id.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            let mut count = 0;
            for record in inner.records.values_mut() {
                if record.subject_id == subject_id && !record.revoked {
                    record.revoked = true;
                    count += 1;
                }
            }
            Ok(count)
        })
    }
}
