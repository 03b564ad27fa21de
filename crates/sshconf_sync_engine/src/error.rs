//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed bulk document.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote service rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote service failed to handle the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Local storage error during sync.
    #[error("storage error: {0}")]
    Storage(#[from] sshconf_core::CoreError),

    /// No sync service is registered under the name.
    #[error("do not support service: {name}")]
    UnknownService {
        /// Requested service name.
        name: String,
    },

    /// A sync service failed.
    #[error("{service} service error: {message}")]
    Service {
        /// Service name.
        service: String,
        /// Error message.
        message: String,
    },

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Creates a service error.
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// The reconciler never retries by itself; callers decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }
}
