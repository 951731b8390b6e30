//! Connection Registry & Poll-Buffer Bridge

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

use super::connection::{Connection, ConnectionInfo, ConnectionStatus};
use super::{ConnectionHandle, Endpoint};
use crate::config::BridgeSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::Connector;

/// Registry of handle-addressed connections with pollable inbound buffers.
///
/// Every operation returns immediately. Transport events arrive in the
/// background and accumulate per handle until [`read`](Self::read) drains them.
pub struct SocketBridge {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    connections: RwLock<Vec<Arc<Connection>>>,
}

impl fmt::Debug for SocketBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketBridge")
            .field("endpoint", &self.endpoint)
            .field("connections", &self.len())
            .finish()
    }
}

impl SocketBridge {
    pub fn new(endpoint: Endpoint, connector: impl Connector + 'static) -> Self {
        info!(
            scheme = %endpoint.scheme(),
            path = endpoint.path(),
            "Created socket bridge"
        );

        Self {
            endpoint,
            connector: Arc::new(connector),
            connections: RwLock::new(Vec::new()),
        }
    }

    /// Create a bridge from configuration
    pub fn from_settings(settings: &BridgeSettings, connector: impl Connector + 'static) -> Self {
        Self::new(Endpoint::new(settings.scheme, &settings.path), connector)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn read_connections(&self) -> RwLockReadGuard<'_, Vec<Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, handle: ConnectionHandle) -> BridgeResult<Arc<Connection>> {
        self.read_connections()
            .get(handle.index())
            .cloned()
            .ok_or(BridgeError::InvalidHandle(handle))
    }

    /// Start connecting to `host:port` and return its handle without waiting
    /// for the handshake.
    #[instrument(skip(self, port), fields(port = %port))]
    pub fn connect(&self, host: &str, port: impl fmt::Display) -> BridgeResult<ConnectionHandle> {
        let uri = self.endpoint.uri_for(host, &port)?;

        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let handle = ConnectionHandle::from_index(connections.len()).ok_or(
            BridgeError::HandlesExhausted {
                issued: connections.len(),
            },
        )?;

        let events = Connection::events_for(handle);
        let transport = self.connector.initiate(&uri, events.clone());
        connections.push(Arc::new(Connection::new(&events, uri, transport)));

        info!(handle = %handle, host, "Connection initiated");
        Ok(handle)
    }

    /// Whether the transport behind `handle` is open
    pub fn is_connected(&self, handle: ConnectionHandle) -> BridgeResult<bool> {
        Ok(self.lookup(handle)?.is_connected())
    }

    /// Forward `message` verbatim to the transport behind `handle`.
    pub fn send(&self, handle: ConnectionHandle, message: &str) -> BridgeResult<()> {
        let connection = self.lookup(handle)?;
        connection
            .send(message)
            .map_err(|source| BridgeError::Transport { handle, source })?;

        debug!(handle = %handle, bytes = message.len(), "Sent message");
        Ok(())
    }

    /// Take all text received on `handle` since the previous read.
    ///
    /// Returns `None` when nothing arrived. Messages that arrived between two
    /// reads come back concatenated, with no delimiter.
    pub fn read(&self, handle: ConnectionHandle) -> BridgeResult<Option<String>> {
        Ok(self.lookup(handle)?.take_pending())
    }

    /// [`read`](Self::read) together with the status at the time of the read.
    ///
    /// A terminal status returned here comes with every message delivered
    /// before the transition, so a poller that stops on `Closed` or `Failed`
    /// loses nothing.
    pub fn poll(
        &self,
        handle: ConnectionHandle,
    ) -> BridgeResult<(ConnectionStatus, Option<String>)> {
        Ok(self.lookup(handle)?.poll())
    }

    pub fn status(&self, handle: ConnectionHandle) -> BridgeResult<ConnectionStatus> {
        Ok(self.lookup(handle)?.status())
    }

    /// Reason for the most recent transport failure on `handle`, if any
    pub fn last_error(&self, handle: ConnectionHandle) -> BridgeResult<Option<String>> {
        Ok(self.lookup(handle)?.last_error())
    }

    /// Close the transport behind `handle`.
    ///
    /// The handle stays registered and is never reused; data received before
    /// the close can still be read.
    pub fn close(&self, handle: ConnectionHandle) -> BridgeResult<()> {
        let connection = self.lookup(handle)?;
        if connection.close() {
            info!(handle = %handle, "Connection closed");
        } else {
            debug!(handle = %handle, "Connection already closed");
        }
        Ok(())
    }

    /// Close every connection. Returns how many transports were released.
    pub fn close_all(&self) -> usize {
        let connections: Vec<_> = self.read_connections().iter().cloned().collect();
        let closed = connections.iter().filter(|c| c.close()).count();

        if closed > 0 {
            info!("Closed {} connections", closed);
        }
        closed
    }

    pub fn connection_info(&self, handle: ConnectionHandle) -> BridgeResult<ConnectionInfo> {
        Ok(self.lookup(handle)?.info())
    }

    /// Snapshots of every registered connection, in handle order
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.read_connections().iter().map(|c| c.info()).collect()
    }

    pub fn stats(&self) -> BridgeStats {
        let mut stats = BridgeStats::default();
        for connection in self.read_connections().iter() {
            stats.total += 1;
            match connection.status() {
                ConnectionStatus::Pending => stats.pending += 1,
                ConnectionStatus::Open => stats.open += 1,
                ConnectionStatus::Failed => stats.failed += 1,
                ConnectionStatus::Closed => stats.closed += 1,
            }
        }
        stats
    }

    /// Number of handles issued so far
    pub fn len(&self) -> usize {
        self.read_connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SocketBridge {
    fn drop(&mut self) {
        let closed = self.close_all();
        if closed > 0 {
            warn!("Socket bridge dropped with {} live connections", closed);
        }
    }
}

/// Connection counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub total: usize,
    pub pending: usize,
    pub open: usize,
    pub failed: usize,
    pub closed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Scheme, DEFAULT_PATH};
    use crate::transport::MemoryConnector;

    fn bridge() -> (SocketBridge, MemoryConnector) {
        let connector = MemoryConnector::new();
        let bridge = SocketBridge::new(Endpoint::new(Scheme::Ws, DEFAULT_PATH), connector.clone());
        (bridge, connector)
    }

    #[test]
    fn test_connect_registers_before_handshake() {
        let (bridge, connector) = bridge();

        let handle = bridge.connect("example.com", 9000).unwrap();
        assert_eq!(handle, ConnectionHandle::new(0));
        assert_eq!(bridge.len(), 1);
        assert_eq!(bridge.status(handle).unwrap(), ConnectionStatus::Pending);
        assert_eq!(
            connector.endpoint(0).unwrap().uri(),
            "ws://example.com:9000/gameserver"
        );
    }

    #[test]
    fn test_malformed_uri_consumes_no_handle() {
        let (bridge, connector) = bridge();

        assert!(matches!(
            bridge.connect("bad host", 80),
            Err(BridgeError::MalformedUri { .. })
        ));
        assert!(bridge.is_empty());
        assert_eq!(connector.initiated(), 0);

        assert_eq!(bridge.connect("good.host", 80).unwrap(), ConnectionHandle::new(0));
    }

    #[test]
    fn test_close_is_idempotent_and_keeps_handle() {
        let (bridge, connector) = bridge();
        let handle = bridge.connect("example.com", 9000).unwrap();
        let endpoint = connector.endpoint(0).unwrap();
        endpoint.open();
        endpoint.deliver("tail");

        bridge.close(handle).unwrap();
        bridge.close(handle).unwrap();

        assert!(endpoint.is_closed());
        assert_eq!(bridge.status(handle).unwrap(), ConnectionStatus::Closed);
        assert!(!bridge.is_connected(handle).unwrap());
        assert_eq!(bridge.read(handle).unwrap().as_deref(), Some("tail"));
        assert!(matches!(
            bridge.send(handle, "x"),
            Err(BridgeError::Transport { .. })
        ));

        let next = bridge.connect("example.com", 9000).unwrap();
        assert_eq!(next, ConnectionHandle::new(1));
    }

    #[test]
    fn test_stats_by_status() {
        let (bridge, connector) = bridge();
        for _ in 0..4 {
            bridge.connect("example.com", 9000).unwrap();
        }
        connector.endpoint(0).unwrap().open();
        connector.endpoint(1).unwrap().fail("refused");
        connector.endpoint(2).unwrap().close_remote();

        assert_eq!(
            bridge.stats(),
            BridgeStats {
                total: 4,
                pending: 1,
                open: 1,
                failed: 1,
                closed: 1,
            }
        );
        assert_eq!(bridge.close_all(), 4);
        assert_eq!(bridge.close_all(), 0);
    }
}
