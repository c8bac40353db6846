//! Adapter error types.
//!
//! All calendar backends surface errors through [`AdapterError`]. Each
//! variant carries enough context for callers to decide how to handle the
//! failure without inspecting opaque strings.

/// Unified error type for Slotwise calendar adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The HTTP request never produced a response.
    #[error("calendar request failed during {operation}: {reason}")]
    RequestFailed { operation: String, reason: String },

    /// The server answered with a non-success status.
    #[error("calendar server returned {status} during {operation}: {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    /// The server's payload could not be understood.
    #[error("could not parse calendar data: {reason}")]
    ParseFailed { reason: String },

    /// The input supplied to the adapter is invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error in adapter setup.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A failure deliberately injected by a test double.
    #[error("injected failure: {0}")]
    Injected(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal adapter error: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Whether repeating the same call later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed { .. } | Self::Injected(_) => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            Self::ParseFailed { .. }
            | Self::InvalidInput(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::Internal(_) => false,
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
