//! # Portcullis
//!
//! Rotating refresh-token session security: single-use rotation, reuse
//! detection, and family-wide revocation over a pluggable session store.
//!
//! ## Core Features
//!
//! - **Token Pairs**: Short-lived HS256 access tokens plus long-lived
//!   refresh tokens, both carrying issuer, audience, expiry, and a type
//!   discriminator ([`codec`], [`claims`])
//! - **Single-Use Rotation**: Each refresh token is consumed by exactly one
//!   rotation; concurrent presentations race on a store-level
//!   compare-and-swap and exactly one wins ([`engine`])
//! - **Reuse Detection**: Presenting an already-rotated token revokes its
//!   entire family, locking out both the thief and the victim until the
//!   next login ([`engine`])
//! - **Pluggable Persistence**: Digest-only storage behind the
//!   [`SessionStore`] trait, with an in-memory implementation and a
//!   Postgres one behind the `postgres` feature ([`store`])
//! - **Request Guarding**: Access-token validation plus account-standing
//!   and role checks ([`guard`])
//! - **Audit Logging**: Every lifecycle transition emits a structured
//!   `tracing` event through [`security_event!`] ([`observability`])
//! - **Browser Transport**: HTTP-only, path-scoped refresh cookie policy
//!   ([`transport`])
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use portcullis::{AuthConfig, MemoryStore, RotationEngine, TokenCodec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     portcullis::init_tracing(portcullis::LogFormat::Compact, "info")?;
//!
//!     let config = AuthConfig::from_env()?;
//!     config.validate_secret()?;
//!
//!     let engine = RotationEngine::new(
//!         Arc::new(MemoryStore::new()),
//!         TokenCodec::new(&config),
//!     );
//!
//!     // Login opens a token family
//!     let pair = engine.login("42", None).await?;
//!
//!     // Rotation consumes the old refresh token and mints a successor
//!     let next = engine.refresh(&pair.refresh_token).await?;
//!
//!     // Replaying the consumed token kills the whole family
//!     assert!(engine.refresh(&pair.refresh_token).await.is_err());
//!     assert!(engine.refresh(&next.refresh_token).await.is_err());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres`: sqlx-backed `PgSessionStore` for shared deployments

pub mod claims;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod guard;
pub mod observability;
pub mod store;
pub mod transport;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use claims::{Claims, TokenType};
pub use codec::{CodecError, TokenCodec};
pub use config::{AuthConfig, ConfigError};
pub use crypto::{constant_time_eq, constant_time_str_eq, random_hex, token_digest};
pub use engine::{AuthError, RotationEngine, TokenPair};
pub use guard::{AccessGuard, GuardError, Principal, PrincipalResolver};
pub use observability::{init_tracing, LogFormat, ObservabilityError, SecurityEvent, Severity};
pub use store::{MemoryStore, NewRecord, RefreshRecord, SessionStore, StoreError};
pub use transport::{CookiePolicy, REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH};
