//! Error types for port virtualization.

/// Errors that can occur while virtualizing ports and buffers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortalError {
    /// The byte store has no entry for the given handle.
    #[error("store handle not found: {handle}")]
    HandleNotFound {
        /// The handle that could not be resolved.
        handle: String,
    },

    /// The backing connection is closed.
    #[error("connection closed: {name}")]
    ConnectionClosed {
        /// Name of the closed connection.
        name: String,
    },

    /// A surrogate marker was recognized but is missing required fields.
    #[error("invalid surrogate marker: {message}")]
    InvalidMarker {
        /// Details about the malformed marker.
        message: String,
    },

    /// The payload nests deeper than the configured limit.
    #[error("payload nesting exceeds maximum depth {max_depth}")]
    DepthExceeded {
        /// Configured depth limit.
        max_depth: usize,
    },

    /// A binary buffer is larger than the configured limit.
    #[error("buffer of {len} bytes exceeds limit of {max} bytes")]
    BufferTooLarge {
        /// Size of the rejected buffer.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// A pending resolution was dropped before its connection arrived.
    #[error("resolution abandoned for connection {name}")]
    ResolutionAbandoned {
        /// Name of the connection that was awaited.
        name: String,
    },

    /// The manager was built with missing or contradictory settings.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// JSON conversion failed.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Details about the failure.
        message: String,
    },
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for port virtualization operations.
pub type PortalResult<T> = Result<T, PortalError>;
