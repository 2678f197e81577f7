//! Authentication Configuration
//!
//! Environment-driven configuration for token issuance with secure defaults
//! and JWT secret validation.
//!
//! # Security Rationale
//!
//! The signing secret is the single point of failure for every token this
//! crate mints. Configuration therefore refuses to start with a secret that
//! is short or built on a guessable pattern, with stricter requirements in
//! production than in development.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::config::AuthConfig;
//!
//! let config = AuthConfig::from_env()?;
//! config.validate_secret()?;
//! ```

use std::fmt;
use std::time::Duration;

/// Minimum secret length outside production
const MIN_SECRET_LEN: usize = 32;
/// Minimum secret length in production
const MIN_SECRET_LEN_PRODUCTION: usize = 64;

/// Token issuance configuration.
///
/// TTL defaults match the usual split: minutes-scale access tokens,
/// days-scale refresh tokens.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC signing secret for HS256
    pub jwt_secret: String,

    /// `iss` claim stamped on and required from every token
    pub issuer: String,

    /// `aud` claim stamped on and required from every token
    pub audience: String,

    /// Access token lifetime (default: 15 minutes)
    pub access_ttl: Duration,

    /// Refresh token lifetime (default: 30 days)
    pub refresh_ttl: Duration,

    /// Deployment environment name; anything other than "production"
    /// relaxes secret requirements and the cookie `Secure` flag
    pub environment: String,
}

impl AuthConfig {
    /// Create a configuration with default TTLs and issuer/audience.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            issuer: "portcullis".to_string(),
            audience: "portcullis-client".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            environment: "development".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `JWT_SECRET`: HMAC signing secret (required)
    /// - `JWT_ISSUER`: Token issuer (default: "portcullis")
    /// - `JWT_AUDIENCE`: Token audience (default: "portcullis-client")
    /// - `ACCESS_TOKEN_TTL`: Access token lifetime (default: "15m")
    /// - `REFRESH_TOKEN_TTL`: Refresh token lifetime (default: "30d")
    /// - `APP_ENV`: Deployment environment (default: "development")
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if `JWT_SECRET` is not set,
    /// and [`ConfigError::InvalidTtl`] if a TTL variable is set but does
    /// not parse. A mistyped lifetime must not quietly become the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingSecret)?;

        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| "portcullis".to_string());
        let audience =
            std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "portcullis-client".to_string());

        let access_ttl = match std::env::var("ACCESS_TOKEN_TTL") {
            Ok(s) => parse_duration(&s).ok_or_else(|| ConfigError::InvalidTtl {
                name: "ACCESS_TOKEN_TTL",
                value: s,
            })?,
            Err(_) => Duration::from_secs(15 * 60),
        };

        let refresh_ttl = match std::env::var("REFRESH_TOKEN_TTL") {
            Ok(s) => parse_duration(&s).ok_or_else(|| ConfigError::InvalidTtl {
                name: "REFRESH_TOKEN_TTL",
                value: s,
            })?,
            Err(_) => Duration::from_secs(30 * 24 * 60 * 60),
        };

        let environment =
            std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            jwt_secret,
            issuer,
            audience,
            access_ttl,
            refresh_ttl,
            environment,
        })
    }

    /// Builder: set issuer
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Builder: set audience
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Builder: set access token lifetime
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Builder: set refresh token lifetime
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Builder: set environment name
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Whether this configuration targets a production deployment
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    /// Validate the signing secret against environment requirements.
    ///
    /// Production requires 64+ characters; other environments 32+. Secrets
    /// containing well-known weak patterns are rejected everywhere.
    pub fn validate_secret(&self) -> Result<(), ConfigError> {
        let minimum = if self.is_production() {
            MIN_SECRET_LEN_PRODUCTION
        } else {
            MIN_SECRET_LEN
        };

        if self.jwt_secret.len() < minimum {
            return Err(ConfigError::SecretTooShort {
                actual: self.jwt_secret.len(),
                minimum,
            });
        }

        if let Some(pattern) = find_weak_pattern(&self.jwt_secret) {
            return Err(ConfigError::WeakSecret {
                pattern: pattern.to_string(),
            });
        }

        Ok(())
    }
}

/// Check for weak patterns in the secret.
fn find_weak_pattern(secret: &str) -> Option<&'static str> {
    const WEAK_PATTERNS: &[&str] = &[
        "secret", "password", "admin", "123456", "qwerty", "default",
        "example", "test", "demo", "sample", "changeme", "letmein",
    ];

    let secret_lower = secret.to_lowercase();
    WEAK_PATTERNS
        .iter()
        .find(|pattern| secret_lower.contains(*pattern))
        .copied()
}

/// Parse duration string (e.g., "30s", "15m", "1h", "30d").
///
/// Bare numbers are seconds. Returns `None` on anything that does not
/// parse, including unrecognized suffixes like "15min".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };

    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .map(|n| Duration::from_secs(n * multiplier))
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `JWT_SECRET` was not provided
    MissingSecret,
    /// Secret is below the minimum length for the environment
    SecretTooShort { actual: usize, minimum: usize },
    /// Secret contains a well-known weak pattern
    WeakSecret { pattern: String },
    /// A TTL environment variable was set but did not parse
    InvalidTtl { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSecret => write!(f, "JWT_SECRET environment variable must be set"),
            Self::SecretTooShort { actual, minimum } => write!(
                f,
                "JWT secret length ({} chars) is below minimum ({} chars)",
                actual, minimum
            ),
            Self::WeakSecret { pattern } => {
                write!(f, "JWT secret contains weak pattern: '{}'", pattern)
            }
            Self::InvalidTtl { name, value } => {
                write!(f, "{} value '{}' is not a valid duration", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
