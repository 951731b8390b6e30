//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM/SIGINT and tears down every connection of a bridge so
//! peers receive a close frame instead of a dropped socket.

use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::bridge::SocketBridge;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Time allowed for close frames to go out
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx, grace }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast shutdown without waiting for a signal
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Shutdown triggered with no subscribers");
        }
    }

    /// Wait for SIGTERM, SIGINT or Ctrl+C, then broadcast shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Close every connection, then give close frames the grace period to
    /// reach their peers.
    pub async fn shutdown_bridge(&self, bridge: &SocketBridge) -> Result<()> {
        let start_time = Instant::now();
        let closed = bridge.close_all();

        if closed > 0 {
            info!("Closed {} connections, waiting {:?} for close frames", closed, self.grace);
            tokio::time::sleep(self.grace).await;
        }

        let stats = bridge.stats();
        info!(
            total = stats.total,
            failed = stats.failed,
            closed = stats.closed,
            "Bridge shut down in {:?}",
            start_time.elapsed()
        );

        Ok(())
    }
}
