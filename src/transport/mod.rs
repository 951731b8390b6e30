//! Transport Module
//!
//! The duplex text transport consumed by the bridge. A [`Connector`] initiates
//! one transport per handle and reports its events through [`ConnectionEvents`].

pub mod memory;
pub mod websocket;

pub use memory::{MemoryConnector, MemoryEndpoint};
pub use websocket::WebSocketConnector;

use crate::bridge::ConnectionEvents;
use crate::error::TransportError;

/// Outbound half of an initiated connection
pub trait Transport: Send + Sync {
    /// Forward a text message verbatim.
    fn send(&self, message: &str) -> Result<(), TransportError>;

    /// Close the underlying connection. Must be safe to call more than once.
    fn close(&self);
}

/// Creates transports for new connections.
///
/// `initiate` must not block on the handshake. Completion and failures are
/// reported later through `events`.
pub trait Connector: Send + Sync {
    fn initiate(&self, uri: &str, events: ConnectionEvents) -> Box<dyn Transport>;
}
