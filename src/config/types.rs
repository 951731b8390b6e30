//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bridge::{Scheme, DEFAULT_PATH};
use crate::transport::websocket::DEFAULT_CONNECT_TIMEOUT;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeSettings,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

/// Bridge endpoint and transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// `ws` or `wss`; the build-time default applies when omitted
    pub scheme: Scheme,
    /// Path component of every connection URI
    pub path: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

/// Polling client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Appended to every line read from stdin before it is sent
    pub line_terminator: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            scheme: Scheme::default(),
            path: DEFAULT_PATH.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            line_terminator: "\n".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
