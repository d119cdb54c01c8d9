//! Error taxonomy for the workflow monitor.
//!
//! Every component returns a typed [`CwmError`]; only the orchestrator
//! decides whether an error is transient, recoverable, or fatal.

use thiserror::Error;

/// Errors surfaced by CI, VCS, fixer, and classifier components.
#[derive(Debug, Error)]
pub enum CwmError {
    /// Transport-level failure talking to the CI provider.
    #[error("network error: {0}")]
    Network(String),

    /// Provider rejected the token or the token lacks scope.
    #[error("auth error: {0}")]
    Auth(String),

    /// Provider returned HTTP 429 (or an equivalent signal).
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the provider asked us to wait before retrying.
        retry_after_secs: u64,
    },

    /// A fixer refused to write outside the configured workspace root.
    #[error("path escape attempt: {0}")]
    PathEscape(String),

    /// A VCS operation failed irrecoverably.
    #[error("vcs error: {0}")]
    Vcs(String),

    /// A fixer subprocess exceeded its hard timeout.
    #[error("timeout running {0}")]
    Timeout(String),

    /// Any other I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Catch-all for unclassified failures, preserved as `Unknown` issues.
    #[error("{0}")]
    Other(String),
}

impl CwmError {
    /// Whether this error represents a transient condition that should never
    /// kill the control loop.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }

    /// Whether this error is fatal and should stop the orchestrator loop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::PathEscape(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CwmError>;
