//! Refresh-Token Rotation Engine
//!
//! The state machine at the heart of the crate: issues token pairs at login,
//! rotates refresh tokens single-use, detects reuse of rotated tokens, and
//! cascades revocation across a token family when theft is suspected.
//!
//! # Rotation Model
//!
//! Each login starts a *family*: a chain of refresh tokens sharing one
//! `family_id`. A refresh token is valid for exactly one rotation. Rotation
//! revokes the presented record and inserts a successor in the same family.
//! If a token that was already rotated (or logged out) is presented again,
//! someone holds a copy that should not exist, so the whole family is
//! revoked and the legitimate holder is forced to re-authenticate.
//!
//! # Concurrency
//!
//! The rotation step is gated on [`SessionStore::compare_and_swap_revoke`]:
//! when several requests race on the same token, exactly one wins the flip
//! and mints the successor. The losers observe an already-revoked record and
//! take the reuse path, which is the safe failure mode.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use portcullis::{AuthConfig, MemoryStore, RotationEngine, TokenCodec};
//!
//! let config = AuthConfig::from_env()?;
//! let engine = RotationEngine::new(Arc::new(MemoryStore::new()), TokenCodec::new(&config));
//!
//! let pair = engine.login("42", None).await?;
//! let next = engine.refresh(&pair.refresh_token).await?;
//! engine.logout(&next.refresh_token).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::claims::{unix_now, TokenType};
use crate::codec::TokenCodec;
use crate::crypto::{random_hex, token_digest};
use crate::observability::SecurityEvent;
use crate::security_event;
use crate::store::{NewRecord, SessionStore, StoreError};

/// Length of a family identifier in hex characters (256 bits)
const FAMILY_ID_LEN: usize = 64;

// ============================================================================
// Errors
// ============================================================================

/// Authentication and rotation failures.
///
/// Decode-level failures (bad signature, expired `exp`, wrong issuer or
/// audience, malformed token, unknown token) all surface as
/// [`AuthError::InvalidToken`]: the caller learns the token was rejected,
/// never which check rejected it. The detailed cause goes to the audit log.
#[derive(Debug)]
pub enum AuthError {
    /// Token failed validation or is unknown to the store
    InvalidToken,
    /// An access token was presented where a refresh token is required
    WrongTokenType,
    /// The stored record outlived its `expires_at`
    Expired,
    /// A revoked token was presented; its family has been revoked
    ReuseDetected,
    /// The successor record collided on insert
    Conflict,
    /// Persistence failure
    Store(StoreError),
    /// Token minting failure
    Internal(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken => write!(f, "invalid token"),
            Self::WrongTokenType => write!(f, "wrong token type"),
            Self::Expired => write!(f, "token expired"),
            Self::ReuseDetected => write!(f, "token reuse detected"),
            Self::Conflict => write!(f, "token rotation conflict"),
            Self::Store(e) => write!(f, "store error: {}", e),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation => Self::Conflict,
            other => Self::Store(other),
        }
    }
}

// ============================================================================
// Token Pair
// ============================================================================

/// The pair handed back by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Short-lived bearer token
    pub access_token: String,
    /// Single-use rotation token
    pub refresh_token: String,
    /// Always "bearer"
    pub token_type: &'static str,
}

impl TokenPair {
    fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer",
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Issues, rotates, and revokes refresh tokens against a [`SessionStore`].
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct RotationEngine {
    store: Arc<dyn SessionStore>,
    codec: TokenCodec,
}

impl fmt::Debug for RotationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationEngine")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl RotationEngine {
    /// Create an engine over a store and codec.
    pub fn new(store: Arc<dyn SessionStore>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    /// The codec this engine mints with
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Start a new session: mint a token pair and open a fresh family.
    ///
    /// `extra` claims (e.g. a role) are stamped onto the access token only;
    /// refresh tokens never carry application claims.
    pub async fn login(
        &self,
        subject: &str,
        extra: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<TokenPair, AuthError> {
        let family_id = random_hex(FAMILY_ID_LEN);
        let pair = self.mint_pair(subject, extra, &family_id).await?;

        security_event!(
            SecurityEvent::TokenIssued,
            subject_id = %subject,
            family_id = %family_id,
            "Session started, token pair issued"
        );

        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, single-use.
    ///
    /// The presented token is revoked whether or not a successor is minted.
    /// Reuse of an already-rotated token revokes the entire family and
    /// returns [`AuthError::ReuseDetected`].
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let claims = match self.codec.decode(presented) {
            Ok(claims) => claims,
            Err(cause) => {
                security_event!(
                    SecurityEvent::TokenRejected,
                    reason = %cause,
                    "Refresh token failed validation"
                );
                return Err(AuthError::InvalidToken);
            }
        };

        if claims.typ != TokenType::Refresh {
            security_event!(
                SecurityEvent::TokenRejected,
                subject_id = %claims.sub,
                reason = "wrong_token_type",
                "Non-refresh token presented for rotation"
            );
            return Err(AuthError::WrongTokenType);
        }

        if !claims.has_subject() {
            return Err(AuthError::InvalidToken);
        }

        let digest = token_digest(presented);
        let record = match self.store.find_by_token_hash(&digest).await? {
            Some(record) => record,
            None => {
                security_event!(
                    SecurityEvent::TokenRejected,
                    subject_id = %claims.sub,
                    reason = "unknown_token",
                    "Valid refresh token has no store record"
                );
                return Err(AuthError::InvalidToken);
            }
        };

        if record.revoked {
            return self.handle_reuse(&record.subject_id, &record.family_id).await;
        }

        // Defensive expiry: the signed exp already passed decode, but the
        // stored bound is authoritative if the two ever disagree.
        if record.expires_at <= unix_now() {
            let _ = self.store.compare_and_swap_revoke(&record.id, None).await?;
            security_event!(
                SecurityEvent::TokenRejected,
                subject_id = %record.subject_id,
                family_id = %record.family_id,
                reason = "record_expired",
                "Refresh token record past its stored expiry"
            );
            return Err(AuthError::Expired);
        }

        // The flip decides the race: exactly one concurrent caller rotates.
        let won = self
            .store
            .compare_and_swap_revoke(&record.id, Some(unix_now()))
            .await?;
        if !won {
            return self.handle_reuse(&record.subject_id, &record.family_id).await;
        }

        let pair = self
            .mint_pair(&record.subject_id, None, &record.family_id)
            .await?;

        security_event!(
            SecurityEvent::TokenRefreshed,
            subject_id = %record.subject_id,
            family_id = %record.family_id,
            "Refresh token rotated"
        );

        Ok(pair)
    }

    /// End a session by its refresh token.
    ///
    /// Idempotent and deliberately forgiving: the token is looked up by
    /// digest without signature validation, so an expired or garbled token
    /// still logs out cleanly. Unknown and already-revoked tokens succeed.
    pub async fn logout(&self, presented: &str) -> Result<(), AuthError> {
        let digest = token_digest(presented);

        if let Some(record) = self.store.find_by_token_hash(&digest).await? {
            if !record.revoked {
                let _ = self.store.compare_and_swap_revoke(&record.id, None).await?;
                security_event!(
                    SecurityEvent::Logout,
                    subject_id = %record.subject_id,
                    family_id = %record.family_id,
                    "Session ended by logout"
                );
            }
        }

        Ok(())
    }

    /// Revoke every token in a family.
    pub async fn revoke_family(&self, family_id: &str) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_by_family(family_id).await?;

        security_event!(
            SecurityEvent::FamilyRevoked,
            family_id = %family_id,
            revoked_count = revoked,
            "Token family revoked"
        );

        Ok(revoked)
    }

    /// Revoke every token a subject holds, across all families.
    ///
    /// The password-change / account-compromise hammer: every device is
    /// signed out at once.
    pub async fn revoke_all_for_subject(&self, subject_id: &str) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_by_subject(subject_id).await?;

        security_event!(
            SecurityEvent::SubjectRevoked,
            subject_id = %subject_id,
            revoked_count = revoked,
            "All sessions revoked for subject"
        );

        Ok(revoked)
    }

    /// Revoked-token path: cascade to the family and report reuse.
    async fn handle_reuse(&self, subject_id: &str, family_id: &str) -> Result<TokenPair, AuthError> {
        let revoked = self.store.revoke_by_family(family_id).await?;

        security_event!(
            SecurityEvent::ReuseDetected,
            subject_id = %subject_id,
            family_id = %family_id,
            revoked_count = revoked,
            "Revoked refresh token presented again, family revoked"
        );

        Err(AuthError::ReuseDetected)
    }

    /// Mint a pair and persist the refresh side under `family_id`.
    async fn mint_pair(
        &self,
        subject: &str,
        extra: Option<HashMap<String, serde_json::Value>>,
        family_id: &str,
    ) -> Result<TokenPair, AuthError> {
        let access = self
            .codec
            .issue_access(subject, extra)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let refresh = self
            .codec
            .issue_refresh(subject)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let expires_at = unix_now() + self.codec.refresh_ttl().as_secs() as i64;
        self.store
            .insert(NewRecord {
                subject_id: subject.to_string(),
                token_hash: token_digest(&refresh),
                family_id: family_id.to_string(),
                expires_at,
            })
            .await?;

        Ok(TokenPair::new(access, refresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::store::MemoryStore;

    fn build_engine() -> (RotationEngine, MemoryStore) {
        let store = MemoryStore::new();
        let codec = TokenCodec::new(&AuthConfig::new(crate::crypto::random_hex(64)));
        (RotationEngine::new(Arc::new(store.clone()), codec), store)
    }

    async fn record_for(store: &MemoryStore, token: &str) -> crate::store::RefreshRecord {
        store
            .find_by_token_hash(&token_digest(token))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_issues_valid_pair() {
        let (engine, store) = build_engine();
        let pair = engine.login("42", None).await.unwrap();

        let access = engine.codec().decode(&pair.access_token).unwrap();
        assert_eq!(access.typ, TokenType::Access);
        assert_eq!(access.sub, "42");

        let refresh = engine.codec().decode(&pair.refresh_token).unwrap();
        assert_eq!(refresh.typ, TokenType::Refresh);

        let record = record_for(&store, &pair.refresh_token).await;
        assert!(!record.revoked);
        assert_eq!(record.subject_id, "42");
        assert_eq!(record.family_id.len(), FAMILY_ID_LEN);
        assert_eq!(pair.token_type, "bearer");
    }

    #[tokio::test]
    async fn test_login_carries_extra_access_claims() {
        let (engine, _store) = build_engine();
        let mut extra = HashMap::new();
        extra.insert("role".to_string(), serde_json::Value::from("admin"));

        let pair = engine.login("42", Some(extra)).await.unwrap();
        let access = engine.codec().decode(&pair.access_token).unwrap();
        assert_eq!(access.extra_str("role"), Some("admin"));

        // Refresh token stays free of application claims
        let refresh = engine.codec().decode(&pair.refresh_token).unwrap();
        assert!(refresh.extra.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rotates_within_family() {
        let (engine, store) = build_engine();
        let first = engine.login("42", None).await.unwrap();
        let old_record = record_for(&store, &first.refresh_token).await;

        let second = engine.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let consumed = record_for(&store, &first.refresh_token).await;
        assert!(consumed.revoked);
        assert!(consumed.last_used_at.is_some());

        let successor = record_for(&store, &second.refresh_token).await;
        assert!(!successor.revoked);
        assert_eq!(successor.family_id, old_record.family_id);
        assert_eq!(successor.subject_id, "42");
    }

    #[tokio::test]
    async fn test_reuse_revokes_whole_family() {
        let (engine, store) = build_engine();
        let first = engine.login("42", None).await.unwrap();
        let second = engine.refresh(&first.refresh_token).await.unwrap();
        let third = engine.refresh(&second.refresh_token).await.unwrap();

        // Replaying the first token is theft: every record dies, including
        // the still-live third.
        let err = engine.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::ReuseDetected));

        let family = record_for(&store, &third.refresh_token)
            .await
            .family_id;
        assert!(store.family_records(&family).iter().all(|r| r.revoked));

        // The legitimate holder is locked out too
        let err = engine.refresh(&third.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::ReuseDetected));
    }

    #[tokio::test]
    async fn test_reuse_does_not_touch_other_families() {
        let (engine, store) = build_engine();
        let phone = engine.login("42", None).await.unwrap();
        let laptop = engine.login("42", None).await.unwrap();

        let rotated = engine.refresh(&phone.refresh_token).await.unwrap();
        let err = engine.refresh(&phone.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::ReuseDetected));

        let _ = rotated;
        let laptop_record = record_for(&store, &laptop.refresh_token).await;
        assert!(!laptop_record.revoked);
        assert!(engine.refresh(&laptop.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_access_token_rejected_for_refresh() {
        let (engine, _store) = build_engine();
        let pair = engine.login("42", None).await.unwrap();

        let err = engine.refresh(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::WrongTokenType));
    }

    #[tokio::test]
    async fn test_garbage_and_foreign_tokens_rejected() {
        let (engine, _store) = build_engine();

        let err = engine.refresh("not-a-token").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        // Validly signed by someone else's secret
        let (other_engine, _other_store) = build_engine();
        let foreign = other_engine.login("42", None).await.unwrap();
        let err = engine.refresh(&foreign.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_valid_token_without_record_rejected() {
        let (engine, _store) = build_engine();

        // Signed by us, never persisted
        let orphan = engine.codec().issue_refresh("42").unwrap();
        let err = engine.refresh(&orphan).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_store_expiry_is_authoritative() {
        let (engine, store) = build_engine();
        let token = engine.codec().issue_refresh("42").unwrap();

        // Record expired even though the signed exp is fine
        store
            .insert(NewRecord {
                subject_id: "42".to_string(),
                token_hash: token_digest(&token),
                family_id: random_hex(FAMILY_ID_LEN),
                expires_at: unix_now() - 10,
            })
            .await
            .unwrap();

        let err = engine.refresh(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));

        let record = record_for(&store, &token).await;
        assert!(record.revoked);
        assert!(record.last_used_at.is_none());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (engine, store) = build_engine();
        let pair = engine.login("42", None).await.unwrap();

        engine.logout(&pair.refresh_token).await.unwrap();
        let record = record_for(&store, &pair.refresh_token).await;
        assert!(record.revoked);
        assert!(record.last_used_at.is_none());

        // Repeat, unknown, and garbage logouts all succeed quietly
        engine.logout(&pair.refresh_token).await.unwrap();
        engine.logout("never-seen-before").await.unwrap();
        engine.logout("").await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_after_logout_is_reuse() {
        let (engine, _store) = build_engine();
        let pair = engine.login("42", None).await.unwrap();

        engine.logout(&pair.refresh_token).await.unwrap();
        let err = engine.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::ReuseDetected));
    }

    #[tokio::test]
    async fn test_revoke_family() {
        let (engine, store) = build_engine();
        let pair = engine.login("42", None).await.unwrap();
        let family = record_for(&store, &pair.refresh_token)
            .await
            .family_id;

        assert_eq!(engine.revoke_family(&family).await.unwrap(), 1);
        assert_eq!(engine.revoke_family(&family).await.unwrap(), 0);

        let err = engine.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::ReuseDetected));
    }

    #[tokio::test]
    async fn test_revoke_all_for_subject() {
        let (engine, _store) = build_engine();
        let phone = engine.login("42", None).await.unwrap();
        let laptop = engine.login("42", None).await.unwrap();
        let other = engine.login("7", None).await.unwrap();

        assert_eq!(engine.revoke_all_for_subject("42").await.unwrap(), 2);

        assert!(matches!(
            engine.refresh(&phone.refresh_token).await.unwrap_err(),
            AuthError::ReuseDetected
        ));
        assert!(matches!(
            engine.refresh(&laptop.refresh_token).await.unwrap_err(),
            AuthError::ReuseDetected
        ));
        // Other subjects untouched
        assert!(engine.refresh(&other.refresh_token).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_single_winner() {
        let (engine, store) = build_engine();
        let pair = engine.login("42", None).await.unwrap();
        let family = record_for(&store, &pair.refresh_token)
            .await
            .family_id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { engine.refresh(&token).await }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);

        // At most one live record survives the race; the losers may have
        // cascaded onto the family after the winner minted its successor.
        let live = store
            .family_records(&family)
            .iter()
            .filter(|r| !r.revoked)
            .count();
        assert!(live <= 1);
    }
}
