//! Security Event Logging
//!
//! Structured audit logging for the token lifecycle: issuance, rotation,
//! reuse detection, and revocation all emit events through one macro so the
//! field shape stays uniform across the crate.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::{security_event, SecurityEvent};
//!
//! security_event!(
//!     SecurityEvent::TokenRefreshed,
//!     subject_id = %subject,
//!     family_id = %family,
//!     "Refresh token rotated"
//! );
//! ```

use std::fmt;

use tracing_subscriber::{fmt as sub_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Audit event categories for the token lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    // Lifecycle events
    /// A new token pair was issued at login
    TokenIssued,
    /// A refresh token was exchanged for a new pair
    TokenRefreshed,
    /// A presented token failed validation
    TokenRejected,
    /// A session ended by explicit logout
    Logout,

    // Revocation events
    /// A revoked refresh token was presented again
    ReuseDetected,
    /// An entire token family was revoked
    FamilyRevoked,
    /// Every session of a subject was revoked
    SubjectRevoked,

    // Authorization events
    /// Access-token guard admitted a request
    AccessGranted,
    /// Access-token guard rejected a request
    AccessDenied,
}

impl SecurityEvent {
    /// Get the event category for filtering/grouping
    pub fn category(&self) -> &'static str {
        match self {
            Self::TokenIssued
            | Self::TokenRefreshed
            | Self::TokenRejected
            | Self::Logout => "token_lifecycle",

            Self::ReuseDetected
            | Self::FamilyRevoked
            | Self::SubjectRevoked => "revocation",

            Self::AccessGranted | Self::AccessDenied => "authorization",
        }
    }

    /// Get the severity level for the event
    pub fn severity(&self) -> Severity {
        match self {
            // Reuse of a rotated token is the theft signal
            Self::ReuseDetected => Severity::Critical,

            Self::TokenRejected | Self::AccessDenied => Severity::High,

            Self::FamilyRevoked | Self::SubjectRevoked => Severity::Medium,

            Self::TokenIssued
            | Self::TokenRefreshed
            | Self::Logout
            | Self::AccessGranted => Severity::Low,
        }
    }

    /// Get the event name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::TokenIssued => "token_issued",
            Self::TokenRefreshed => "token_refreshed",
            Self::TokenRejected => "token_rejected",
            Self::Logout => "logout",
            Self::ReuseDetected => "reuse_detected",
            Self::FamilyRevoked => "family_revoked",
            Self::SubjectRevoked => "subject_revoked",
            Self::AccessGranted => "access_granted",
            Self::AccessDenied => "access_denied",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine operations
    Low,
    /// Important state changes
    Medium,
    /// Security-relevant failures
    High,
    /// Immediate attention required
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Log a security event with structured fields.
///
/// Each call carries `security_event`, `category`, and `severity` fields
/// automatically; severity selects the tracing level.
///
/// # Examples
///
/// ```ignore
/// security_event!(
///     SecurityEvent::ReuseDetected,
///     family_id = %family,
///     "Revoked refresh token presented again"
/// );
/// ```
#[macro_export]
macro_rules! security_event {
    ($event:expr, $($field:tt)*) => {{
        let event = $event;
        let severity = event.severity();
        let category = event.category();
        let event_name = event.name();

        match severity {
            $crate::observability::Severity::Critical => {
                ::tracing::error!(
                    security_event = event_name,
                    category = category,
                    severity = "critical",
                    $($field)*
                );
            }
            $crate::observability::Severity::High => {
                ::tracing::warn!(
                    security_event = event_name,
                    category = category,
                    severity = "high",
                    $($field)*
                );
            }
            $crate::observability::Severity::Medium => {
                ::tracing::info!(
                    security_event = event_name,
                    category = category,
                    severity = "medium",
                    $($field)*
                );
            }
            $crate::observability::Severity::Low => {
                ::tracing::debug!(
                    security_event = event_name,
                    category = category,
                    severity = "low",
                    $($field)*
                );
            }
        }
    }};
}

pub use security_event;

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output for development
    Pretty,
    /// Newline-delimited JSON for log aggregation
    Json,
    /// Single-line output
    Compact,
}

/// Observability setup errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservabilityError {
    /// Invalid configuration value
    Config(String),
    /// Subscriber installation failed
    Provider(String),
}

impl fmt::Display for ObservabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "observability config error: {}", msg),
            Self::Provider(msg) => write!(f, "observability provider error: {}", msg),
        }
    }
}

impl std::error::Error for ObservabilityError {}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Call once at startup;
/// a second call fails because the global subscriber is already set.
pub fn init_tracing(format: LogFormat, default_filter: &str) -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| ObservabilityError::Config(format!("Invalid log filter: {}", e)))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => {
            subscriber
                .with(
                    sub_fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init()
                .map_err(|e| ObservabilityError::Provider(format!("Failed to init tracing: {}", e)))?;
        }
        LogFormat::Json => {
            subscriber
                .with(
                    sub_fmt::layer()
                        .json()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init()
                .map_err(|e| ObservabilityError::Provider(format!("Failed to init tracing: {}", e)))?;
        }
        LogFormat::Compact => {
            subscriber
                .with(sub_fmt::layer().compact().with_target(true))
                .try_init()
                .map_err(|e| ObservabilityError::Provider(format!("Failed to init tracing: {}", e)))?;
        }
    }

    Ok(())
}
