//! Tests for configuration file loading

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use wsbridge::config::ConfigManager;
use wsbridge::{Endpoint, MemoryConnector, Scheme, SocketBridge};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(
        r#"
        [bridge]
        scheme = "ws"
        path = "lobby"
        connect_timeout = "3s"

        [client]
        poll_interval = "25ms"
        line_terminator = "\r\n"

        [logging]
        level = "debug"
        "#,
    );

    let config = ConfigManager::load_from_file(file.path()).unwrap();
    assert_eq!(config.bridge.scheme, Scheme::Ws);
    assert_eq!(config.bridge.path, "lobby");
    assert_eq!(config.bridge.connect_timeout, Duration::from_secs(3));
    assert_eq!(config.client.poll_interval, Duration::from_millis(25));
    assert_eq!(config.client.line_terminator, "\r\n");
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigManager::load_from_file(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.bridge.scheme, Scheme::default());
    assert_eq!(config.bridge.path, "gameserver");
}

#[test]
fn test_invalid_files_are_rejected() {
    let unparsable = write_config("[bridge\nscheme = ");
    assert!(ConfigManager::load_from_file(unparsable.path()).is_err());

    let bad_scheme = write_config("[bridge]\nscheme = \"http\"\n");
    assert!(ConfigManager::load_from_file(bad_scheme.path()).is_err());

    let bad_timeout = write_config("[bridge]\nconnect_timeout = \"0s\"\n");
    let err = ConfigManager::load_from_file(bad_timeout.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("connect_timeout"));
}

#[test]
fn test_bridge_uses_configured_endpoint() {
    let file = write_config("[bridge]\nscheme = \"wss\"\npath = \"/arena\"\n");
    let config = ConfigManager::load_from_file(file.path()).unwrap();

    let connector = MemoryConnector::new();
    let bridge = SocketBridge::from_settings(&config.bridge, connector.clone());
    assert_eq!(bridge.endpoint(), &Endpoint::new(Scheme::Wss, "arena"));

    bridge.connect("play.example.com", 443).unwrap();
    assert_eq!(
        connector.endpoint(0).unwrap().uri(),
        "wss://play.example.com:443/arena"
    );
}
