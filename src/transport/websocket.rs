//! WebSocket Transport (tokio-tungstenite)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, instrument, warn};

use super::{Connector, Transport};
use crate::bridge::ConnectionEvents;
use crate::error::TransportError;

/// Default time allowed for the TCP/TLS/WebSocket handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

enum Outbound {
    Text(String),
    Close,
}

/// Connector that opens real WebSocket connections on a tokio runtime.
///
/// The bridge itself never awaits; each connection runs as a task on the
/// runtime and reports back through its event sink.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    runtime: Handle,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(runtime: Handle) -> Self {
        install_crypto_provider();
        Self {
            runtime,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Use the runtime of the calling context.
    pub fn current() -> crate::Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| anyhow::anyhow!("WebSocket connector requires a tokio runtime: {}", e))?;
        Ok(Self::new(runtime))
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Connector for WebSocketConnector {
    fn initiate(&self, uri: &str, events: ConnectionEvents) -> Box<dyn Transport> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        let task = self.runtime.spawn(run_connection(
            uri.to_string(),
            events.clone(),
            outbound_rx,
            self.connect_timeout,
            Arc::clone(&open),
        ));
        let abort = task.abort_handle();
        self.runtime.spawn(watch_connection(task, events));

        Box::new(WebSocketTransport {
            outbound: outbound_tx,
            open,
            task: abort,
        })
    }
}

struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
    task: AbortHandle,
}

impl Transport for WebSocketTransport {
    fn send(&self, message: &str) -> Result<(), TransportError> {
        if self.outbound.is_closed() {
            return Err(TransportError::Closed);
        }
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(Outbound::Text(message.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        // A connection still handshaking has nothing to flush
        if !self.open.load(Ordering::Acquire) || self.outbound.send(Outbound::Close).is_err() {
            self.task.abort();
        }
    }
}

/// Install the process-wide rustls provider used for `wss` handshakes.
///
/// Only the first install wins; later calls are no-ops.
fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok()
    {
        debug!("Installed ring crypto provider for TLS");
    }
}

/// Report a connection task that died without reaching a terminal status.
async fn watch_connection(task: JoinHandle<()>, events: ConnectionEvents) {
    match task.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => events.closed(),
        Err(e) => events.failed(format!("connection task failed: {}", e)),
    }
}

/// Drive one WebSocket connection until either side closes it.
#[instrument(skip_all, fields(handle = %events.handle(), uri = %uri))]
async fn run_connection(
    uri: String,
    events: ConnectionEvents,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    connect_timeout: Duration,
    open: Arc<AtomicBool>,
) {
    debug!("Starting WebSocket handshake");

    let stream = match timeout(connect_timeout, connect_async(uri.as_str())).await {
        Ok(Ok((stream, response))) => {
            debug!(status = %response.status(), "WebSocket handshake complete");
            stream
        }
        Ok(Err(e)) => {
            events.failed(format!("connect failed: {}", e));
            return;
        }
        Err(_) => {
            events.failed(format!("connect timed out after {:?}", connect_timeout));
            return;
        }
    };

    open.store(true, Ordering::Release);
    events.opened();

    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => events.message(&text),
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "Decoding binary frame as text");
                    events.message(&String::from_utf8_lossy(&data));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Peer sent close frame");
                    events.closed();
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite
                }
                Some(Err(e)) => {
                    events.failed(format!("read failed: {}", e));
                    break;
                }
                None => {
                    events.closed();
                    break;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(message)) => {
                    if let Err(e) = sink.send(Message::Text(message)).await {
                        events.failed(format!("send failed: {}", e));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!("Closing WebSocket");
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send close frame");
                    }
                    events.closed();
                    break;
                }
            },
        }
    }

    open.store(false, Ordering::Release);
    outbound.close();
}
