//! Configuration Manager

use super::Config;
use crate::bridge::Scheme;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "WSBRIDGE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config = Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse configuration from TOML text without validating it
    pub fn parse(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration, reading `WSBRIDGE_*` variables through `lookup`
    pub fn load_from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Override fields from `WSBRIDGE_*` variables that are present
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(scheme) = var("SCHEME") {
            self.bridge.scheme = scheme
                .parse::<Scheme>()
                .with_context(|| format!("Invalid {}SCHEME: {}", ENV_PREFIX, scheme))?;
        }

        if let Some(path) = var("PATH") {
            self.bridge.path = path;
        }

        if let Some(timeout) = var("CONNECT_TIMEOUT") {
            self.bridge.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid {}CONNECT_TIMEOUT: {}", ENV_PREFIX, timeout))?;
        }

        if let Some(interval) = var("POLL_INTERVAL") {
            self.client.poll_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid {}POLL_INTERVAL: {}", ENV_PREFIX, interval))?;
        }

        if let Some(log_level) = var("LOG_LEVEL") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_bridge_config()
            .with_context(|| "Bridge configuration validation failed")?;

        self.validate_client_config()
            .with_context(|| "Client configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_bridge_config(&self) -> Result<()> {
        let path = self.bridge.path.trim_start_matches('/');
        if path.is_empty() {
            bail!("bridge.path must not be empty");
        }

        if let Some(c) = path
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '~')))
        {
            bail!("bridge.path contains invalid character {:?}", c);
        }

        if self.bridge.connect_timeout.is_zero() {
            bail!("bridge.connect_timeout must be greater than 0");
        }

        if self.bridge.connect_timeout > Duration::from_secs(300) {
            bail!("bridge.connect_timeout cannot exceed 5 minutes");
        }

        Ok(())
    }

    fn validate_client_config(&self) -> Result<()> {
        if self.client.poll_interval < Duration::from_millis(1) {
            bail!("client.poll_interval must be at least 1ms");
        }

        if self.client.poll_interval > Duration::from_secs(10) {
            bail!("client.poll_interval cannot exceed 10 seconds");
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!(
                "logging.level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        scheme: Option<Scheme>,
        path: Option<&str>,
        connect_timeout: Option<Duration>,
        poll_interval: Option<Duration>,
    ) {
        if let Some(scheme) = scheme {
            self.bridge.scheme = scheme;
            tracing::info!("CLI override: scheme set to {}", scheme);
        }

        if let Some(path) = path {
            self.bridge.path = path.to_string();
            tracing::info!("CLI override: path set to {}", path);
        }

        if let Some(timeout) = connect_timeout {
            self.bridge.connect_timeout = timeout;
            tracing::info!("CLI override: connect timeout set to {:?}", timeout);
        }

        if let Some(interval) = poll_interval {
            self.client.poll_interval = interval;
            tracing::info!("CLI override: poll interval set to {:?}", interval);
        }
    }
}
