//! wsbridge Library
//!
//! Handle-multiplexed WebSocket bridge for callers that cannot await.
//!
//! [`SocketBridge`] hands out integer handles from `connect`, forwards `send`
//! immediately, and buffers inbound text per handle until a polling `read`
//! takes it. Transport events are driven by a tokio runtime in the background
//! while every bridge operation returns immediately.

pub mod bridge;
pub mod config;
pub mod error;
pub mod shutdown;
pub mod transport;

pub use bridge::{ConnectionHandle, ConnectionStatus, Endpoint, Scheme, SocketBridge};
pub use config::Config;
pub use error::{BridgeError, BridgeResult, TransportError};
pub use shutdown::ShutdownCoordinator;
pub use transport::{Connector, MemoryConnector, Transport, WebSocketConnector};

/// Common error type for configuration and application code
pub type Result<T> = anyhow::Result<T>;
