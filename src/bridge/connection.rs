//! Connection records and transport event reactions

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::ConnectionHandle;
use crate::error::TransportError;
use crate::transport::Transport;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Transport initiated, handshake not complete
    Pending,
    Open,
    /// Handshake or transport failed; see `last_error`
    Failed,
    /// Closed locally or by the peer
    Closed,
}

impl ConnectionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Failed | ConnectionStatus::Closed)
    }
}

/// Mutable per-connection state, written by transport events and drained by reads.
#[derive(Debug)]
struct ConnectionState {
    status: ConnectionStatus,
    pending: Option<String>,
    last_error: Option<String>,
    messages_received: u64,
    bytes_received: u64,
    messages_sent: u64,
    bytes_sent: u64,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::Pending,
            pending: None,
            last_error: None,
            messages_received: 0,
            bytes_received: 0,
            messages_sent: 0,
            bytes_sent: 0,
        }
    }
}

type SharedState = Arc<Mutex<ConnectionState>>;

fn lock(state: &Mutex<ConnectionState>) -> MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event sink handed to a transport, scoped to a single handle.
///
/// Transports report `opened`, `message`, `failed` and `closed` here; nothing
/// else in the bridge is reachable through it.
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    handle: ConnectionHandle,
    state: SharedState,
}

impl ConnectionEvents {
    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    /// Transport finished its handshake.
    pub fn opened(&self) {
        let mut state = lock(&self.state);
        if state.status == ConnectionStatus::Pending {
            state.status = ConnectionStatus::Open;
            info!(handle = %self.handle, "Connection open");
        } else {
            debug!(handle = %self.handle, status = ?state.status, "Ignoring open event");
        }
    }

    /// Inbound payload. Appended to the pending buffer without a delimiter.
    pub fn message(&self, payload: &str) {
        let mut state = lock(&self.state);
        match state.pending.as_mut() {
            Some(buffer) => buffer.push_str(payload),
            None => state.pending = Some(payload.to_owned()),
        }
        state.messages_received += 1;
        state.bytes_received += payload.len() as u64;
        debug!(handle = %self.handle, bytes = payload.len(), "Buffered inbound message");
    }

    /// Transport failed to connect or broke after opening.
    pub fn failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = lock(&self.state);
        if state.status.is_terminal() {
            debug!(
                handle = %self.handle,
                status = ?state.status,
                error = %reason,
                "Ignoring failure event"
            );
            return;
        }
        state.status = ConnectionStatus::Failed;
        warn!(handle = %self.handle, error = %reason, "Connection failed");
        state.last_error = Some(reason);
    }

    /// Peer closed the transport.
    pub fn closed(&self) {
        let mut state = lock(&self.state);
        if !state.status.is_terminal() {
            state.status = ConnectionStatus::Closed;
            info!(handle = %self.handle, "Connection closed by peer");
        }
    }
}

/// A single registry entry
pub struct Connection {
    handle: ConnectionHandle,
    uri: String,
    created_at: Instant,
    state: SharedState,
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .field("uri", &self.uri)
            .field("status", &self.status())
            .finish()
    }
}

impl Connection {
    /// Event sink for a connection that is about to be initiated.
    pub(crate) fn events_for(handle: ConnectionHandle) -> ConnectionEvents {
        ConnectionEvents {
            handle,
            state: Arc::new(Mutex::new(ConnectionState::new())),
        }
    }

    pub(crate) fn new(events: &ConnectionEvents, uri: String, transport: Box<dyn Transport>) -> Self {
        Self {
            handle: events.handle,
            uri,
            created_at: Instant::now(),
            state: Arc::clone(&events.state),
            transport: Mutex::new(Some(transport)),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.state).status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    /// Take everything buffered since the last read.
    pub(crate) fn take_pending(&self) -> Option<String> {
        lock(&self.state).pending.take()
    }

    /// Status and pending data, taken under one lock so data that arrived
    /// before a close or failure is returned together with that status.
    pub(crate) fn poll(&self) -> (ConnectionStatus, Option<String>) {
        let mut state = lock(&self.state);
        (state.status, state.pending.take())
    }

    pub(crate) fn send(&self, message: &str) -> Result<(), TransportError> {
        let transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        let transport = transport
            .as_ref()
            .ok_or(TransportError::Closed)?;
        transport.send(message)?;

        let mut state = lock(&self.state);
        state.messages_sent += 1;
        state.bytes_sent += message.len() as u64;
        Ok(())
    }

    /// Release the transport. Returns false if it was already released.
    pub(crate) fn close(&self) -> bool {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        {
            let mut state = lock(&self.state);
            if !state.status.is_terminal() {
                state.status = ConnectionStatus::Closed;
            }
        }

        match transport {
            Some(transport) => {
                transport.close();
                true
            }
            None => false,
        }
    }

    pub fn info(&self) -> ConnectionInfo {
        let state = lock(&self.state);
        ConnectionInfo {
            handle: self.handle,
            uri: self.uri.clone(),
            status: state.status,
            last_error: state.last_error.clone(),
            pending_bytes: state.pending.as_ref().map_or(0, String::len),
            messages_received: state.messages_received,
            bytes_received: state.bytes_received,
            messages_sent: state.messages_sent,
            bytes_sent: state.bytes_sent,
            age: self.created_at.elapsed(),
        }
    }
}

/// Point-in-time snapshot of a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub handle: ConnectionHandle,
    pub uri: String,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub pending_bytes: usize,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    #[serde(with = "humantime_serde")]
    pub age: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> ConnectionEvents {
        Connection::events_for(ConnectionHandle::new(0))
    }

    #[test]
    fn test_messages_concatenate_in_arrival_order() {
        let events = events();
        events.message("ab");
        events.message("");
        events.message("cd");

        let mut state = lock(&events.state);
        assert_eq!(state.pending.take().as_deref(), Some("abcd"));
        assert_eq!(state.messages_received, 3);
        assert_eq!(state.bytes_received, 4);
    }

    #[test]
    fn test_empty_payload_is_not_the_sentinel() {
        let events = events();
        events.message("");
        assert_eq!(lock(&events.state).pending.as_deref(), Some(""));
    }

    #[test]
    fn test_status_transitions() {
        let events = events();
        assert_eq!(lock(&events.state).status, ConnectionStatus::Pending);

        events.opened();
        assert_eq!(lock(&events.state).status, ConnectionStatus::Open);

        events.failed("reset by peer");
        assert_eq!(lock(&events.state).status, ConnectionStatus::Failed);

        // Terminal states stick
        events.opened();
        events.closed();
        events.failed("late error");
        let state = lock(&events.state);
        assert_eq!(state.status, ConnectionStatus::Failed);
        assert_eq!(state.last_error.as_deref(), Some("reset by peer"));
    }

    #[test]
    fn test_peer_close_before_open() {
        let events = events();
        events.closed();
        events.opened();
        assert_eq!(lock(&events.state).status, ConnectionStatus::Closed);
    }

    #[test]
    fn test_failure_after_close_is_ignored() {
        let events = events();
        events.opened();
        events.closed();
        events.failed("read failed: connection reset");

        let state = lock(&events.state);
        assert_eq!(state.status, ConnectionStatus::Closed);
        assert_eq!(state.last_error, None);
    }
}
