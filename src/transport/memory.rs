//! In-process Transport
//!
//! Nothing goes over the network. Every initiated connection is recorded as a
//! [`MemoryEndpoint`] that drives the peer side by hand: open the connection,
//! deliver messages, fail it, or inspect what the bridge sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::{Connector, Transport};
use crate::bridge::{ConnectionEvents, ConnectionHandle};
use crate::error::TransportError;

#[derive(Debug, Default)]
struct Wire {
    open: bool,
    closed: bool,
    sent: Vec<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector that keeps every initiated connection in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    endpoints: Arc<Mutex<Vec<MemoryEndpoint>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint created by the `index`-th call to `initiate`
    pub fn endpoint(&self, index: usize) -> Option<MemoryEndpoint> {
        lock(&self.endpoints).get(index).cloned()
    }

    /// Endpoint initiated for `handle`
    pub fn endpoint_for(&self, handle: ConnectionHandle) -> Option<MemoryEndpoint> {
        lock(&self.endpoints)
            .iter()
            .find(|endpoint| endpoint.handle() == handle)
            .cloned()
    }

    /// Number of connections initiated so far
    pub fn initiated(&self) -> usize {
        lock(&self.endpoints).len()
    }
}

impl Connector for MemoryConnector {
    fn initiate(&self, uri: &str, events: ConnectionEvents) -> Box<dyn Transport> {
        debug!(handle = %events.handle(), uri, "Initiating in-memory transport");

        let wire = Arc::new(Mutex::new(Wire::default()));
        lock(&self.endpoints).push(MemoryEndpoint {
            uri: uri.to_string(),
            events,
            wire: Arc::clone(&wire),
        });

        Box::new(MemoryTransport { wire })
    }
}

/// Peer side of an in-memory connection
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    uri: String,
    events: ConnectionEvents,
    wire: Arc<Mutex<Wire>>,
}

impl MemoryEndpoint {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.events.handle()
    }

    /// Complete the handshake.
    pub fn open(&self) {
        lock(&self.wire).open = true;
        self.events.opened();
    }

    /// Push an inbound message to the bridge.
    pub fn deliver(&self, payload: &str) {
        self.events.message(payload);
    }

    /// Fail the connection.
    pub fn fail(&self, reason: &str) {
        {
            let mut wire = lock(&self.wire);
            wire.open = false;
            wire.closed = true;
        }
        self.events.failed(reason);
    }

    /// Close from the peer side.
    pub fn close_remote(&self) {
        {
            let mut wire = lock(&self.wire);
            wire.open = false;
            wire.closed = true;
        }
        self.events.closed();
    }

    /// Messages the bridge sent, in order
    pub fn sent(&self) -> Vec<String> {
        lock(&self.wire).sent.clone()
    }

    /// Whether either side closed the connection
    pub fn is_closed(&self) -> bool {
        lock(&self.wire).closed
    }
}

struct MemoryTransport {
    wire: Arc<Mutex<Wire>>,
}

impl Transport for MemoryTransport {
    fn send(&self, message: &str) -> Result<(), TransportError> {
        let mut wire = lock(&self.wire);
        if wire.closed {
            return Err(TransportError::Closed);
        }
        if !wire.open {
            return Err(TransportError::NotOpen);
        }
        wire.sent.push(message.to_string());
        Ok(())
    }

    fn close(&self) {
        let mut wire = lock(&self.wire);
        wire.open = false;
        wire.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Connection;

    #[test]
    fn test_send_requires_open_transport() {
        let connector = MemoryConnector::new();
        let events = Connection::events_for(ConnectionHandle::new(3));
        let transport = connector.initiate("ws://example.com:80/gameserver", events);

        assert_eq!(transport.send("early"), Err(TransportError::NotOpen));

        let endpoint = connector.endpoint(0).unwrap();
        assert_eq!(endpoint.handle(), ConnectionHandle::new(3));
        endpoint.open();
        assert!(transport.send("hello").is_ok());
        assert_eq!(endpoint.sent(), vec!["hello".to_string()]);

        transport.close();
        transport.close();
        assert!(endpoint.is_closed());
        assert_eq!(transport.send("late"), Err(TransportError::Closed));
    }

    #[test]
    fn test_endpoints_are_recorded_in_order() {
        let connector = MemoryConnector::new();
        for i in 0..3 {
            let events = Connection::events_for(ConnectionHandle::new(i));
            let _ = connector.initiate(&format!("ws://host:{}/gameserver", 1000 + i), events);
        }

        assert_eq!(connector.initiated(), 3);
        assert_eq!(connector.endpoint(2).unwrap().uri(), "ws://host:1002/gameserver");
        assert!(connector.endpoint_for(ConnectionHandle::new(1)).is_some());
        assert!(connector.endpoint(3).is_none());
    }
}
