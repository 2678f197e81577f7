//! Bearer Token Codec
//!
//! Signed, time-bounded token encode/decode over HS256.
//!
//! # Design Philosophy
//!
//! The codec owns every check a token can fail *on its own*: signature,
//! issuer, audience, and expiry. Decode returns an error kind instead of
//! raising, so callers branch on the failure without exception-style flow.
//! Anything that needs store state (revocation, reuse) belongs to the
//! rotation engine, not here.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::{AuthConfig, TokenCodec};
//!
//! let codec = TokenCodec::new(&AuthConfig::from_env()?);
//! let token = codec.issue_access("42", None)?;
//! let claims = codec.decode(&token)?;
//! assert_eq!(claims.sub, "42");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::claims::{Claims, TokenType};
use crate::config::AuthConfig;
use crate::crypto::random_hex;

/// Length of the `jti` claim in hex characters (128 bits)
const JTI_LEN: usize = 32;

/// Token decode failures, split by cause.
///
/// The rotation engine collapses most of these into a single authentication
/// failure at its boundary; the split exists for logging and for the
/// defensive checks that care which validation tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Signature did not verify
    SignatureInvalid,
    /// `exp` claim is in the past
    Expired,
    /// `iss` claim does not match the configured issuer
    IssuerMismatch,
    /// `aud` claim does not match the configured audience
    AudienceMismatch,
    /// Structurally invalid token or unencodable claims
    Malformed,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureInvalid => write!(f, "token signature invalid"),
            Self::Expired => write!(f, "token expired"),
            Self::IssuerMismatch => write!(f, "token issuer mismatch"),
            Self::AudienceMismatch => write!(f, "token audience mismatch"),
            Self::Malformed => write!(f, "token malformed"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Encodes and decodes the signed bearer tokens this crate manages.
///
/// Issuer, audience, and expiry validation are applied on every decode;
/// a token that makes it out of [`TokenCodec::decode`] is signed by us,
/// addressed to us, and not yet expired.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec from authentication configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Mint an access token for `subject`, optionally carrying extra claims.
    pub fn issue_access(
        &self,
        subject: &str,
        extra: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<String, CodecError> {
        let mut claims = Claims::new(
            subject,
            &self.issuer,
            &self.audience,
            TokenType::Access,
            self.access_ttl.as_secs() as i64,
        );
        claims.jti = random_hex(JTI_LEN);
        if let Some(extra) = extra {
            claims.extra = extra;
        }
        self.encode(&claims)
    }

    /// Mint a refresh token for `subject`.
    pub fn issue_refresh(&self, subject: &str) -> Result<String, CodecError> {
        let mut claims = Claims::new(
            subject,
            &self.issuer,
            &self.audience,
            TokenType::Refresh,
            self.refresh_ttl.as_secs() as i64,
        );
        claims.jti = random_hex(JTI_LEN);
        self.encode(&claims)
    }

    /// Encode arbitrary claims into a signed token.
    pub fn encode(&self, claims: &Claims) -> Result<String, CodecError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|_| CodecError::Malformed)
    }

    /// Decode and validate a token.
    ///
    /// Verifies signature, issuer, audience, and expiry. The claims come back
    /// exactly as encoded, unknown fields in the extension map.
    pub fn decode(&self, token: &str) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => CodecError::SignatureInvalid,
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => CodecError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => CodecError::IssuerMismatch,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => CodecError::AudienceMismatch,
                _ => CodecError::Malformed,
            })
    }

    /// Configured refresh token lifetime
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::unix_now;

    fn test_codec() -> TokenCodec {
        TokenCodec::new(&AuthConfig::new(crate::crypto::random_hex(64)))
    }

    #[test]
    fn test_round_trip_access() {
        let codec = test_codec();
        let token = codec.issue_access("42", None).unwrap();

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.typ, TokenType::Access);
        assert_eq!(claims.jti.len(), JTI_LEN);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_round_trip_refresh() {
        let codec = test_codec();
        let token = codec.issue_refresh("42").unwrap();

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.typ, TokenType::Refresh);
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn test_extra_claims_survive() {
        let codec = test_codec();
        let mut extra = HashMap::new();
        extra.insert("role".to_string(), serde_json::Value::from("admin"));

        let token = codec.issue_access("42", Some(extra)).unwrap();
        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.extra_str("role"), Some("admin"));
    }

    #[test]
    fn test_unique_jti() {
        let codec = test_codec();
        let a = codec.decode(&codec.issue_access("42", None).unwrap()).unwrap();
        let b = codec.decode(&codec.issue_access("42", None).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let codec = test_codec();
        let other = test_codec();

        let token = codec.issue_access("42", None).unwrap();
        assert_eq!(other.decode(&token), Err(CodecError::SignatureInvalid));
    }

    #[test]
    fn test_expired_rejected() {
        let codec = test_codec();

        // Expired well past the default leeway
        let mut claims = Claims::new("42", "portcullis", "portcullis-client", TokenType::Access, 0);
        claims.iat = unix_now() - 600;
        claims.exp = unix_now() - 300;
        claims.jti = random_hex(JTI_LEN);

        let token = codec.encode(&claims).unwrap();
        assert_eq!(codec.decode(&token), Err(CodecError::Expired));
    }

    #[test]
    fn test_issuer_mismatch() {
        let secret = crate::crypto::random_hex(64);
        let ours = TokenCodec::new(&AuthConfig::new(secret.clone()));
        let theirs = TokenCodec::new(&AuthConfig::new(secret).with_issuer("someone-else"));

        let token = theirs.issue_access("42", None).unwrap();
        assert_eq!(ours.decode(&token), Err(CodecError::IssuerMismatch));
    }

    #[test]
    fn test_audience_mismatch() {
        let secret = crate::crypto::random_hex(64);
        let ours = TokenCodec::new(&AuthConfig::new(secret.clone()));
        let theirs = TokenCodec::new(&AuthConfig::new(secret).with_audience("other-app"));

        let token = theirs.issue_access("42", None).unwrap();
        assert_eq!(ours.decode(&token), Err(CodecError::AudienceMismatch));
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = test_codec();
        assert_eq!(codec.decode("not-a-token"), Err(CodecError::Malformed));
        assert_eq!(codec.decode(""), Err(CodecError::Malformed));
    }
}
