//! Error types for statebus.
//!
//! All errors returned to callers are strongly typed using thiserror.
//! Hydration and persistence failures are deliberately absent: they never
//! reach caller code as `Err`, they are reported through diagnostics and
//! the system-event stream instead.

use thiserror::Error;

/// Boxed error produced by user-supplied hydrator and persist callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while parsing or resolving a dotted property path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Property path cannot be empty")]
    Empty,

    #[error("Property path '{path}' contains an empty segment")]
    EmptySegment {
        path: String,
    },

    #[error("Property path '{path}' uses the reserved '@@' prefix")]
    Reserved {
        path: String,
    },

    #[error("Property path '{path}' does not resolve in the current state")]
    NotFound {
        path: String,
    },
}

/// Errors raised by pull-style subscriber streams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream '{stream}' is disconnected")]
    Disconnected {
        stream: String,
    },

    #[error("No event received within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Errors raised by the snapshot file codec.
#[cfg(feature = "persistent")]
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is corrupted: {reason}")]
    Corrupted {
        reason: String,
    },

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion {
        found: u8,
        expected: u8,
    },

    #[error("Snapshot file '{path}' does not exist")]
    Missing {
        path: String,
    },
}

/// Top-level error type for statebus.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[cfg(feature = "persistent")]
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Failed to encode value: {message}")]
    Encode {
        message: String,
    },

    #[error("Failed to decode value at '{path}': {message}")]
    Decode {
        path: String,
        message: String,
    },

    #[error("No async runtime available for {operation}")]
    SchedulerUnavailable {
        operation: String,
    },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl StoreError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode {
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn scheduler_unavailable(operation: impl Into<String>) -> Self {
        Self::SchedulerUnavailable {
            operation: operation.into(),
        }
    }

    /// Returns true if this is a path error.
    #[must_use]
    pub const fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// Returns true if this is a stream error.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true if this is an encode or decode error.
    #[must_use]
    pub const fn is_codec(&self) -> bool {
        matches!(self, Self::Encode { .. } | Self::Decode { .. })
    }

    /// Returns true if the operation needed a runtime that was not available.
    #[must_use]
    pub const fn is_scheduler_unavailable(&self) -> bool {
        matches!(self, Self::SchedulerUnavailable { .. })
    }

    /// Returns true if retrying the same call can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Stream(StreamError::Timeout { .. }))
    }
}

/// Result type alias for statebus operations.
pub type StoreResult<T> = Result<T, StoreError>;
