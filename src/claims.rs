//! Bearer Token Claims
//!
//! Fixed claims struct for the signed tokens this crate issues and consumes.
//!
//! # Design Philosophy
//!
//! Token payloads are a *closed* shape: the standard registered claims plus a
//! `typ` discriminator, with application-specific additions confined to the
//! [`Claims::extra`] map. Handlers never merge ad-hoc dictionaries into a
//! payload, so the codec contract stays statically checkable.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::claims::{Claims, TokenType};
//!
//! let claims = Claims::new("42", "my-service", "my-clients", TokenType::Access, 900)
//!     .with_extra("role", "admin");
//! assert_eq!(claims.typ, TokenType::Access);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Discriminator carried in the `typ` claim.
///
/// Every token this crate mints is tagged so an access token can never be
/// replayed against the refresh endpoint, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived bearer token presented on every request
    Access,
    /// Long-lived token exchanged for a new pair via rotation
    Refresh,
}

impl TokenType {
    /// Get the claim value as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Claims carried by every token the codec produces.
///
/// Registered claims follow RFC 7519. The `extra` map is the only place for
/// application-specific claims (e.g. a `role`), and unknown claims land there
/// on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier (the authenticated principal)
    pub sub: String,
    /// Token issuer
    pub iss: String,
    /// Intended audience
    pub aud: String,
    /// Issued-at, Unix seconds
    pub iat: i64,
    /// Expiry, Unix seconds
    pub exp: i64,
    /// Unique token identifier
    pub jti: String,
    /// Token type discriminator
    pub typ: TokenType,
    /// Closed extension map for application claims
    #[serde(flatten, default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Create claims expiring `ttl_secs` from now.
    ///
    /// The `jti` is left empty; the codec assigns one at mint time.
    pub fn new(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        typ: TokenType,
        ttl_secs: i64,
    ) -> Self {
        let now = unix_now();
        Self {
            sub: subject.into(),
            iss: issuer.into(),
            aud: audience.into(),
            iat: now,
            exp: now + ttl_secs,
            jti: String::new(),
            typ,
            extra: HashMap::new(),
        }
    }

    /// Builder: add an application claim to the extension map
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Get an application claim as a string
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    /// Check whether the subject claim is present and non-empty
    pub fn has_subject(&self) -> bool {
        !self.sub.is_empty()
    }
}

/// Current time as Unix seconds
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_type_serialization() {
        assert_eq!(serde_json::to_string(&TokenType::Access).unwrap(), "\"access\"");
        assert_eq!(serde_json::to_string(&TokenType::Refresh).unwrap(), "\"refresh\"");

        let typ: TokenType = serde_json::from_str("\"refresh\"").unwrap();
        assert_eq!(typ, TokenType::Refresh);
    }

    #[test]
    fn test_claims_window() {
        let claims = Claims::new("42", "iss", "aud", TokenType::Access, 900);
        assert_eq!(claims.exp - claims.iat, 900);
        assert!(claims.has_subject());
    }

    #[test]
    fn test_extra_claims_round_trip() {
        let claims = Claims::new("42", "iss", "aud", TokenType::Access, 900)
            .with_extra("role", "admin");

        let json = serde_json::to_string(&claims).unwrap();
        // Flattened, not nested under "extra"
        assert!(json.contains("\"role\":\"admin\""));
        assert!(!json.contains("\"extra\""));

        let back: Claims = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra_str("role"), Some("admin"));
        assert_eq!(back, claims);
    }

    #[test]
    fn test_unknown_claims_land_in_extra() {
        let json = r#"{"sub":"42","iss":"i","aud":"a","iat":1,"exp":2,"jti":"x","typ":"access","tenant":"acme"}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.extra_str("tenant"), Some("acme"));
    }

    #[test]
    fn test_empty_subject_detected() {
        let claims = Claims::new("", "iss", "aud", TokenType::Refresh, 60);
        assert!(!claims.has_subject());
    }
}
