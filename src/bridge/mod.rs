//! Socket Bridge Module
//!
//! Hands out integer handles for WebSocket connections and buffers inbound
//! text per handle until a polling reader drains it.

pub mod connection;
pub mod endpoint;
pub mod handle;
pub mod registry;

pub use connection::{Connection, ConnectionEvents, ConnectionInfo, ConnectionStatus};
pub use endpoint::{Endpoint, Scheme, DEFAULT_PATH};
pub use handle::ConnectionHandle;
pub use registry::{BridgeStats, SocketBridge};
