//! Error types for cache backends.

/// Errors that can occur when talking to a cache backend.
///
/// The engine treats every variant as a transport failure and fails open, so
/// these never reach the application.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    /// The backend did not answer in time.
    #[error("backend operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The backend answered with something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend does not implement the requested operation.
    #[error("operation not supported by {backend}: {operation}")]
    Unsupported { backend: String, operation: String },

    /// The backend has been closed.
    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    /// Creates a new unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a new protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new unsupported-operation error.
    pub fn unsupported(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend: backend.into(),
            operation: operation.into(),
        }
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}
