//! Access Token Guard
//!
//! Request-side counterpart to the rotation engine: validates a presented
//! access token and resolves it to a live principal before any handler runs.
//!
//! # Design Philosophy
//!
//! Token validity and account standing are separate questions. The codec
//! answers the first; a [`PrincipalResolver`] answers the second against
//! whatever user storage the application has. A cryptographically perfect
//! token for a deactivated account is still a rejection.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::{AccessGuard, GuardError};
//!
//! let principal = guard.authenticate(bearer_token).await?;
//! guard.require_role(&principal, "admin")?;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::claims::TokenType;
use crate::codec::TokenCodec;
use crate::observability::SecurityEvent;
use crate::security_event;

/// The authenticated caller a guard hands to application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject identifier from the token
    pub subject_id: String,
    /// Role, if the application assigns one
    pub role: Option<String>,
    /// Whether the account is in good standing
    pub active: bool,
}

/// Guard rejections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Token invalid, expired, wrong type, or subject unknown
    Unauthenticated,
    /// Token valid but the account is deactivated
    AccountInactive,
    /// Principal lacks the required role
    Forbidden,
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "could not validate credentials"),
            Self::AccountInactive => write!(f, "account is inactive"),
            Self::Forbidden => write!(f, "insufficient permissions"),
        }
    }
}

impl std::error::Error for GuardError {}

/// Maps a token subject to the current account state.
///
/// Implement this against your user storage. Returning `None` means the
/// subject no longer exists; the guard treats that the same as a bad token.
pub trait PrincipalResolver: Send + Sync {
    /// Resolve a subject identifier to its principal, if any.
    fn resolve(
        &self,
        subject_id: &str,
    ) -> Pin<Box<dyn Future<Output = Option<Principal>> + Send + '_>>;
}

/// Validates access tokens and enforces account standing and roles.
pub struct AccessGuard<R> {
    codec: TokenCodec,
    resolver: R,
}

impl<R: fmt::Debug> fmt::Debug for AccessGuard<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGuard")
            .field("codec", &self.codec)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl<R: PrincipalResolver> AccessGuard<R> {
    /// Create a guard over a codec and resolver.
    pub fn new(codec: TokenCodec, resolver: R) -> Self {
        Self { codec, resolver }
    }

    /// Validate an access token and resolve its principal.
    ///
    /// Checks signature, issuer, audience, expiry, and the `typ`
    /// discriminator, then confirms the subject still exists and is active.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, GuardError> {
        let claims = match self.codec.decode(token) {
            Ok(claims) => claims,
            Err(cause) => {
                security_event!(
                    SecurityEvent::AccessDenied,
                    reason = %cause,
                    "Access token failed validation"
                );
                return Err(GuardError::Unauthenticated);
            }
        };

        // A refresh token must never act as a bearer credential
        if claims.typ != TokenType::Access {
            security_event!(
                SecurityEvent::AccessDenied,
                subject_id = %claims.sub,
                reason = "wrong_token_type",
                "Non-access token presented as bearer credential"
            );
            return Err(GuardError::Unauthenticated);
        }

        if !claims.has_subject() {
            return Err(GuardError::Unauthenticated);
        }

        let principal = match self.resolver.resolve(&claims.sub).await {
            Some(principal) => principal,
            None => {
                security_event!(
                    SecurityEvent::AccessDenied,
                    subject_id = %claims.sub,
                    reason = "unknown_subject",
                    "Access token subject has no account"
                );
                return Err(GuardError::Unauthenticated);
            }
        };

        if !principal.active {
            security_event!(
                SecurityEvent::AccessDenied,
                subject_id = %principal.subject_id,
                reason = "account_inactive",
                "Access token presented for deactivated account"
            );
            return Err(GuardError::AccountInactive);
        }

        security_event!(
            SecurityEvent::AccessGranted,
            subject_id = %principal.subject_id,
            "Access token accepted"
        );

        Ok(principal)
    }

    /// Require that an authenticated principal holds `role`.
    pub fn require_role(&self, principal: &Principal, role: &str) -> Result<(), GuardError> {
        match principal.role.as_deref() {
            Some(held) if held == role => Ok(()),
            _ => {
                security_event!(
                    SecurityEvent::AccessDenied,
                    subject_id = %principal.subject_id,
                    required_role = %role,
                    reason = "missing_role",
                    "Principal lacks required role"
                );
                Err(GuardError::Forbidden)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use std::collections::HashMap;

    /// Fixed-map resolver for tests
    struct MapResolver {
        principals: HashMap<String, Principal>,
    }

    impl MapResolver {
        fn new(principals: Vec<Principal>) -> Self {
            Self {
                principals: principals
                    .into_iter()
                    .map(|p| (p.subject_id.clone(), p))
                    .collect(),
            }
        }
    }

    impl PrincipalResolver for MapResolver {
        fn resolve(
            &self,
            subject_id: &str,
        ) -> Pin<Box<dyn Future<Output = Option<Principal>> + Send + '_>> {
            let found = self.principals.get(subject_id).cloned();
            Box::pin(async move { found })
        }
    }

    fn principal(id: &str, role: Option<&str>, active: bool) -> Principal {
        Principal {
            subject_id: id.to_string(),
            role: role.map(String::from),
            active,
        }
    }

    fn build_guard() -> (AccessGuard<MapResolver>, TokenCodec) {
        let codec = TokenCodec::new(&AuthConfig::new(crate::crypto::random_hex(64)));
        let resolver = MapResolver::new(vec![
            principal("42", Some("admin"), true),
            principal("7", None, true),
            principal("13", Some("admin"), false),
        ]);
        (AccessGuard::new(codec.clone(), resolver), codec)
    }

    #[tokio::test]
    async fn test_valid_access_token_accepted() {
        let (guard, codec) = build_guard();
        let token = codec.issue_access("42", None).unwrap();

        let principal = guard.authenticate(&token).await.unwrap();
        assert_eq!(principal.subject_id, "42");
        assert_eq!(principal.role.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_bearer() {
        let (guard, codec) = build_guard();
        let token = codec.issue_refresh("42").unwrap();

        assert_eq!(
            guard.authenticate(&token).await,
            Err(GuardError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_garbage_rejected() {
        let (guard, _codec) = build_guard();
        assert_eq!(
            guard.authenticate("not-a-token").await,
            Err(GuardError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_unknown_subject_rejected() {
        let (guard, codec) = build_guard();
        let token = codec.issue_access("9999", None).unwrap();

        assert_eq!(
            guard.authenticate(&token).await,
            Err(GuardError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_inactive_account_rejected() {
        let (guard, codec) = build_guard();
        let token = codec.issue_access("13", None).unwrap();

        assert_eq!(
            guard.authenticate(&token).await,
            Err(GuardError::AccountInactive)
        );
    }

    #[tokio::test]
    async fn test_require_role() {
        let (guard, codec) = build_guard();

        let admin_token = codec.issue_access("42", None).unwrap();
        let admin = guard.authenticate(&admin_token).await.unwrap();
        assert!(guard.require_role(&admin, "admin").is_ok());
        assert_eq!(guard.require_role(&admin, "auditor"), Err(GuardError::Forbidden));

        let plain_token = codec.issue_access("7", None).unwrap();
        let plain = guard.authenticate(&plain_token).await.unwrap();
        assert_eq!(guard.require_role(&plain, "admin"), Err(GuardError::Forbidden));
    }
}
