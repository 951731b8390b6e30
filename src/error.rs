//! Bridge Error Types

use thiserror::Error;

use crate::bridge::ConnectionHandle;

/// Errors returned by bridge operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The handle was never issued by this bridge
    #[error("invalid connection handle {0}")]
    InvalidHandle(ConnectionHandle),

    /// Every handle value has been issued; handles are never reused
    #[error("connection handles exhausted after {issued} connections")]
    HandlesExhausted { issued: usize },

    /// Host/port could not form a connection URI
    #[error("malformed connection URI {uri:?}: {reason}")]
    MalformedUri { uri: String, reason: String },

    /// The transport behind a handle rejected an operation
    #[error("transport failure on handle {handle}: {source}")]
    Transport {
        handle: ConnectionHandle,
        #[source]
        source: TransportError,
    },
}

impl BridgeError {
    pub(crate) fn malformed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}

/// Errors reported by a [`Transport`](crate::transport::Transport)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,

    #[error("transport is closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Result type for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
