//! Error kinds surfaced by the conversion core.
//!
//! The binary wraps these in `anyhow` and prints [`Error::kind`] next to
//! the message so a failed run always names what went wrong.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, invalid or rejected credentials.
    #[error("authentication failed: {0}")]
    UpstreamAuth(String),

    /// The requested workspace does not exist (or is not visible to the token).
    #[error("workspace not found: {0}")]
    UpstreamNotFound(String),

    /// Network failure, timeout, throttling or 5xx. Retryable.
    #[error("upstream unavailable: {0}")]
    UpstreamTransient(String),

    /// The API answered with a shape we do not understand.
    #[error("unexpected upstream response: {0}")]
    UpstreamProtocol(String),

    /// An issue is missing structurally required fields.
    #[error("cannot convert issue {issue}: {reason}")]
    Conversion { issue: String, reason: String },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external cancellation signal fired before the operation finished.
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn conversion(issue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            issue: issue.into(),
            reason: reason.into(),
        }
    }

    /// Stable name of the error kind, used in user-facing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamAuth(_) => "UpstreamAuthError",
            Self::UpstreamNotFound(_) => "UpstreamNotFoundError",
            Self::UpstreamTransient(_) => "UpstreamTransientError",
            Self::UpstreamProtocol(_) => "UpstreamProtocolError",
            Self::Conversion { .. } => "ConversionError",
            Self::Io { .. } => "IOError",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamTransient(_))
    }
}
