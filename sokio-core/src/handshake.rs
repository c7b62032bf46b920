//! HTTP Upgrade handshake (RFC 6455 §4).
//!
//! The client sends a `GET` with a random 16-byte `Sec-WebSocket-Key`; the
//! server answers `101 Switching Protocols` with
//! `Sec-WebSocket-Accept = base64(SHA-1(key + GUID))`.

use std::collections::HashMap;

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::HandshakeError;

/// WebSocket magic GUID for Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Status text a client looks for in the server's response.
pub const SWITCHING_PROTOCOLS: &str = "101 Switching Protocols";

/// Blank line terminating the HTTP header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Compute Sec-WebSocket-Accept value from client key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Generate a fresh base64-encoded 16-byte nonce for Sec-WebSocket-Key.
pub fn generate_key() -> String {
    let nonce = rand::random::<[u8; 16]>();
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// Index just past the `\r\n\r\n` ending the header block, if present.
pub fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Parse header lines: split on CRLF, then on the first colon.
///
/// Names are lowercased so lookups are case-insensitive. Lines without a
/// colon (the request line, the blank terminator) are skipped.
pub fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

/// Client-side upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub host: String,
    pub path: String,
    /// Base64 nonce sent as Sec-WebSocket-Key
    pub key: String,
}

impl ClientRequest {
    /// Create a request with a freshly generated key.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            host: host.into(),
            path: if path.is_empty() { "/".to_string() } else { path },
            key: generate_key(),
        }
    }

    /// Build the raw HTTP request.
    pub fn to_http(&self) -> String {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            self.path, self.host, self.key
        )
    }

    /// The accept value a compliant server will answer with.
    pub fn expected_accept(&self) -> String {
        compute_accept_key(&self.key)
    }
}

/// Check the server's raw response for `101 Switching Protocols`.
pub fn verify_response(raw: &str) -> Result<(), HandshakeError> {
    if raw.contains(SWITCHING_PROTOCOLS) {
        Ok(())
    } else {
        let status = raw.lines().next().unwrap_or_default().trim().to_string();
        Err(HandshakeError::Rejected(status))
    }
}

/// Parsed server-side upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Request path from the request line, if one was present
    pub path: Option<String>,

    /// Sec-WebSocket-Key header
    pub key: String,

    /// All headers, names lowercased
    pub headers: HashMap<String, String>,
}

impl UpgradeRequest {
    /// Parse an HTTP upgrade request.
    pub fn parse(request: &[u8]) -> Result<Self, HandshakeError> {
        let raw = std::str::from_utf8(request).map_err(|_| HandshakeError::InvalidUtf8)?;

        let path = raw
            .split("\r\n")
            .next()
            .filter(|line| line.starts_with("GET "))
            .and_then(|line| line.split_whitespace().nth(1))
            .map(str::to_string);

        let headers = parse_headers(raw);
        let key = headers
            .get("sec-websocket-key")
            .filter(|k| !k.is_empty())
            .ok_or(HandshakeError::MissingKey)?
            .clone();

        Ok(Self { path, key, headers })
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Build the `101 Switching Protocols` response for this request.
    pub fn response(&self) -> String {
        server_response(&self.key)
    }
}

/// Build the HTTP 101 response for a client key.
pub fn server_response(key: &str) -> String {
    let accept = compute_accept_key(key);
    format!(
        "HTTP/1.1 {SWITCHING_PROTOCOLS}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

/// Build an error response for failed upgrades.
pub fn error_response(status: u16, reason: &str) -> String {
    let status_text = match status {
        400 => "Bad Request",
        426 => "Upgrade Required",
        431 => "Request Header Fields Too Large",
        _ => "Error",
    };

    format!(
        "HTTP/1.1 {status} {status_text}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {reason}",
        reason.len()
    )
}
