//! Outbound connections by `ws://` URL.

use std::sync::Arc;

use sokio_core::HandshakeError;
use tokio::net::TcpStream;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ConnectionError;

const DEFAULT_PORT: u16 = 80;

/// A parsed `ws://host[:port][/path]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    pub host: String,
    pub port: u16,
    /// Always starts with `/`
    pub path: String,
}

impl WsUrl {
    pub fn parse(url: &str) -> Result<Self, HandshakeError> {
        let invalid = |why: &str| HandshakeError::InvalidUrl(format!("{url}: {why}"));

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        if scheme.eq_ignore_ascii_case("wss") {
            return Err(invalid("TLS is not supported"));
        }
        if !scheme.eq_ignore_ascii_case("ws") {
            return Err(invalid("scheme must be ws"));
        }

        let (authority, path) = match rest.find(['/', '?']) {
            Some(i) if rest.as_bytes()[i] == b'/' => (&rest[..i], rest[i..].to_string()),
            Some(i) => (&rest[..i], format!("/{}", &rest[i..])),
            None => (rest, "/".to_string()),
        };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // [v6]:port
            let (host, after) = bracketed.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
            let port = match after.strip_prefix(':') {
                Some(port) => Some(port),
                None if after.is_empty() => None,
                None => return Err(invalid("unexpected text after host")),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("bad port"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            path,
        })
    }

    /// `host:port` as sent in the `Host` header.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Entry points for client-role connections.
pub struct Client;

impl Client {
    /// Connect and start receiving.
    pub async fn connect(url: &str) -> Result<Arc<Connection>, ConnectionError> {
        Self::connect_with(url, ConnectionConfig::default()).await
    }

    pub async fn connect_with(url: &str, config: ConnectionConfig) -> Result<Arc<Connection>, ConnectionError> {
        let conn = Self::open(url, config).await?;
        conn.start();
        Ok(conn)
    }

    /// Connect without starting the receive loop, so handlers can be
    /// registered before the first frame is read.
    pub async fn open(url: &str, config: ConnectionConfig) -> Result<Arc<Connection>, ConnectionError> {
        let url = WsUrl::parse(url)?;
        let stream = TcpStream::connect((url.host.as_str(), url.port)).await?;
        if let Err(e) = stream.set_nodelay(true) {
            log::trace!("set_nodelay failed: {e}");
        }
        log::debug!("TCP connected to {}", url.authority());

        Connection::connect(stream, &url.authority(), &url.path, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        let url = WsUrl::parse("ws://example.com:9001/chat/room").unwrap();
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, 9001);
        assert_eq!(url.path, "/chat/room");
        assert_eq!(url.authority(), "example.com:9001");
    }

    #[test]
    fn test_parse_defaults() {
        let url = WsUrl::parse("ws://localhost").unwrap();
        assert_eq!(url.port, 80);
        assert_eq!(url.path, "/");

        let url = WsUrl::parse("WS://localhost?token=1").unwrap();
        assert_eq!(url.path, "/?token=1");
    }

    #[test]
    fn test_parse_ipv6() {
        let url = WsUrl::parse("ws://[::1]:8080/").unwrap();
        assert_eq!(url.host, "::1");
        assert_eq!(url.port, 8080);
        assert_eq!(url.authority(), "[::1]:8080");
    }

    #[test]
    fn test_parse_rejects() {
        for bad in [
            "localhost:80",
            "http://localhost",
            "wss://localhost",
            "ws://",
            "ws://:80",
            "ws://host:notaport",
            "ws://host:70000",
            "ws://[::1",
        ] {
            assert!(
                matches!(WsUrl::parse(bad), Err(HandshakeError::InvalidUrl(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_connect_invalid_url() {
        assert!(matches!(
            Client::connect("wss://localhost").await,
            Err(ConnectionError::Handshake(HandshakeError::InvalidUrl(_)))
        ));
    }
}
