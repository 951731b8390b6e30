//! wsbridge - Poll-driven WebSocket client
//!
//! Connects one bridge handle, forwards stdin lines to it and prints whatever
//! each poll of `read` returns to stdout.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsbridge::config::{ClientConfig, ConfigManager};
use wsbridge::{
    ConnectionHandle, ConnectionStatus, Scheme, ShutdownCoordinator, SocketBridge,
    WebSocketConnector,
};

/// Time given to close frames on exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// CLI arguments for wsbridge
#[derive(Parser, Debug)]
#[command(name = "wsbridge")]
#[command(about = "wsbridge - Poll-driven WebSocket client over a handle bridge")]
#[command(version)]
#[command(long_about = "
wsbridge - Poll-driven WebSocket client over a handle bridge

Connects to <scheme>://<host>:<port>/<path>, sends every stdin line (with a
trailing newline) once the connection is open, and prints received text to
stdout as it is polled.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  WSBRIDGE_SCHEME           - ws or wss
  WSBRIDGE_PATH             - URI path (default: gameserver)
  WSBRIDGE_CONNECT_TIMEOUT  - Handshake timeout (e.g., 10s)
  WSBRIDGE_POLL_INTERVAL    - Poll interval (e.g., 50ms)
  WSBRIDGE_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Host to connect to
    #[arg(long, required_unless_present = "validate_config")]
    pub host: Option<String>,

    /// Port to connect to
    #[arg(short, long, required_unless_present = "validate_config")]
    pub port: Option<String>,

    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "wsbridge.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// URI scheme (overrides config file)
    #[arg(long, value_enum)]
    pub scheme: Option<Scheme>,

    /// URI path (overrides config file)
    #[arg(long)]
    pub path: Option<String>,

    /// Interval between reads, e.g. 50ms
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Handshake timeout, e.g. 10s
    #[arg(long, value_parser = humantime::parse_duration)]
    pub connect_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Exit once stdin is exhausted and all lines are sent
    #[arg(long)]
    pub exit_on_eof: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.scheme,
        args.path.as_deref(),
        args.connect_timeout,
        args.poll_interval,
    );
    if args.verbose {
        config.logging.level = "debug".to_string();
    } else if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&config.logging.level)?;

    info!("Starting wsbridge v{}", env!("CARGO_PKG_VERSION"));

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Scheme: {}", config.bridge.scheme);
        info!("  Path: /{}", config.bridge.path.trim_start_matches('/'));
        info!("  Connect timeout: {:?}", config.bridge.connect_timeout);
        info!("  Poll interval: {:?}", config.client.poll_interval);
        return Ok(());
    }

    let (Some(host), Some(port)) = (args.host.as_deref(), args.port.as_deref()) else {
        bail!("--host and --port are required");
    };

    let coordinator = Arc::new(ShutdownCoordinator::new(SHUTDOWN_GRACE));
    let mut shutdown_rx = coordinator.subscribe();
    let signal_task = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = coordinator.listen_for_signals().await {
                error!("Error setting up signal handlers: {}", e);
            }
        })
    };

    let connector =
        WebSocketConnector::current()?.with_connect_timeout(config.bridge.connect_timeout);
    let bridge = SocketBridge::from_settings(&config.bridge, connector);

    let handle = bridge
        .connect(host, port)
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
    info!(
        "Connecting handle {} to {}",
        handle,
        bridge.connection_info(handle)?.uri
    );

    let result = run_client(
        &bridge,
        handle,
        &config.client,
        args.exit_on_eof,
        &mut shutdown_rx,
    )
    .await;

    coordinator.shutdown_bridge(&bridge).await?;
    signal_task.abort();

    let info = bridge.connection_info(handle)?;
    debug!("Final connection state: {}", serde_json::to_string(&info)?);
    info!(
        "Received {} bytes in {} messages, sent {} bytes in {} messages",
        info.bytes_received, info.messages_received, info.bytes_sent, info.messages_sent
    );

    result
}

/// Poll loop: queue stdin lines until the handle is open, then send them;
/// print every non-empty read, including the last one before a close.
async fn run_client(
    bridge: &SocketBridge,
    handle: ConnectionHandle,
    client: &ClientConfig,
    exit_on_eof: bool,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut outbox: VecDeque<String> = VecDeque::new();
    let mut stdout = tokio::io::stdout();

    let mut ticker = tokio::time::interval(client.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) => outbox.push_back(format!("{}{}", line, client.line_terminator)),
                    None => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                }
            }
            _ = ticker.tick() => {
                let (status, data) = bridge.poll(handle)?;
                if let Some(data) = data {
                    stdout.write_all(data.as_bytes()).await?;
                    stdout.flush().await?;
                }

                match status {
                    ConnectionStatus::Pending => {}
                    ConnectionStatus::Open => {
                        while let Some(message) = outbox.pop_front() {
                            if let Err(e) = bridge.send(handle, &message) {
                                warn!("Send failed, will retry on next poll: {}", e);
                                outbox.push_front(message);
                                break;
                            }
                        }

                        if exit_on_eof && !stdin_open && outbox.is_empty() {
                            info!("Input exhausted, exiting");
                            return Ok(());
                        }
                    }
                    ConnectionStatus::Failed => {
                        let reason = bridge.last_error(handle)?.unwrap_or_default();
                        bail!("Connection {} failed: {}", handle, reason);
                    }
                    ConnectionStatus::Closed => {
                        info!("Connection {} closed by peer", handle);
                        return Ok(());
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested");
                return Ok(());
            }
        }
    }
}

/// Initialize tracing/logging. Output goes to stderr; stdout carries data.
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
