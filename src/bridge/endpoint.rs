//! Endpoint and URI construction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use tokio_tungstenite::tungstenite::http::Uri;

use crate::error::{BridgeError, BridgeResult};

/// Path appended to every connection URI unless configured otherwise
pub const DEFAULT_PATH: &str = "gameserver";

/// WebSocket URI scheme, fixed per bridge instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain `ws://`
    Ws,
    /// TLS `wss://`
    Wss,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Scheme::Wss)
    }
}

impl Default for Scheme {
    /// `wss` when built with the `secure` feature, `ws` otherwise.
    fn default() -> Self {
        if cfg!(feature = "secure") {
            Scheme::Wss
        } else {
            Scheme::Ws
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ws" | "plain" => Ok(Scheme::Ws),
            "wss" | "secure" => Ok(Scheme::Wss),
            other => anyhow::bail!("unknown scheme '{}', expected 'ws' or 'wss'", other),
        }
    }
}

/// Scheme and path shared by every connection of one bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    path: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(Scheme::default(), DEFAULT_PATH)
    }
}

impl Endpoint {
    /// Create an endpoint. Leading slashes on `path` are ignored.
    pub fn new(scheme: Scheme, path: impl AsRef<str>) -> Self {
        Self {
            scheme,
            path: path.as_ref().trim_start_matches('/').to_string(),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Build `scheme://host:port/path`, failing fast on anything that cannot
    /// form a valid URI.
    pub fn uri_for(&self, host: &str, port: impl fmt::Display) -> BridgeResult<String> {
        let port = port.to_string();
        let uri = format!("{}://{}:{}/{}", self.scheme, host, port, self.path);

        validate_host(host).map_err(|reason| BridgeError::malformed(&uri, reason))?;
        validate_port(&port).map_err(|reason| BridgeError::malformed(&uri, reason))?;

        uri.parse::<Uri>()
            .map_err(|e| BridgeError::malformed(&uri, e.to_string()))?;

        Ok(uri)
    }
}

fn validate_host(host: &str) -> Result<(), String> {
    if host.is_empty() {
        return Err("host is empty".to_string());
    }

    if let Some(c) = host
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@'))
    {
        return Err(format!("host contains invalid character {:?}", c));
    }

    let bracketed = host.starts_with('[') && host.ends_with(']');
    if host.contains(':') && !bracketed {
        return Err("IPv6 host literals must be enclosed in brackets".to_string());
    }

    Ok(())
}

fn validate_port(port: &str) -> Result<(), String> {
    match port.parse::<u16>() {
        Ok(0) => Err("port must be between 1 and 65535".to_string()),
        Ok(_) if port.starts_with('+') => Err(format!("invalid port {:?}", port)),
        Ok(_) => Ok(()),
        Err(_) => Err(format!("invalid port {:?}", port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_gameserver_uri() {
        let endpoint = Endpoint::new(Scheme::Ws, DEFAULT_PATH);
        assert_eq!(
            endpoint.uri_for("example.com", 9000).unwrap(),
            "ws://example.com:9000/gameserver"
        );

        let endpoint = Endpoint::new(Scheme::Wss, "/gameserver");
        assert_eq!(
            endpoint.uri_for("example.com", "443").unwrap(),
            "wss://example.com:443/gameserver"
        );
    }

    #[test]
    fn test_accepts_bracketed_ipv6() {
        let endpoint = Endpoint::new(Scheme::Ws, DEFAULT_PATH);
        assert_eq!(
            endpoint.uri_for("[::1]", 8080).unwrap(),
            "ws://[::1]:8080/gameserver"
        );
    }

    #[test]
    fn test_rejects_malformed_hosts() {
        let endpoint = Endpoint::new(Scheme::Ws, DEFAULT_PATH);

        for host in ["", "bad host", "a/b", "user@host", "::1", "host?x", "host#frag"] {
            let err = endpoint.uri_for(host, 80).unwrap_err();
            assert!(
                matches!(err, BridgeError::MalformedUri { .. }),
                "host {:?} should be rejected, got {:?}",
                host,
                err
            );
        }
    }

    #[test]
    fn test_rejects_malformed_ports() {
        let endpoint = Endpoint::new(Scheme::Ws, DEFAULT_PATH);

        for port in ["", "0", "65536", "http", "-1", "+80", "80 "] {
            let err = endpoint.uri_for("example.com", port).unwrap_err();
            assert!(matches!(err, BridgeError::MalformedUri { .. }), "port {:?}", port);
        }
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("ws".parse::<Scheme>().unwrap(), Scheme::Ws);
        assert_eq!("WSS".parse::<Scheme>().unwrap(), Scheme::Wss);
        assert_eq!("secure".parse::<Scheme>().unwrap(), Scheme::Wss);
        assert!("http".parse::<Scheme>().is_err());
    }

    #[test]
    fn test_default_scheme_follows_feature() {
        assert_eq!(Scheme::default().is_secure(), cfg!(feature = "secure"));
    }
}
