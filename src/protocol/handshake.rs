//! HTTP/1.1 upgrade codec (RFC 6455 section 4).
//!
//! Pure parse/serialize for the two halves of the opening handshake. The
//! I/O that drives them over a stream lives in [`crate::upgrade`].

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The GUID appended to the client key before hashing (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the `Sec-WebSocket-Accept` value for a client key:
/// base64(SHA-1(key + GUID)).
///
/// # Example
///
/// ```
/// use wsframe::protocol::accept_key;
///
/// assert_eq!(
///     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Parse header lines into a map keyed by lowercased name.
///
/// Duplicates of the handshake-critical headers are rejected; later values
/// of other headers win.
fn parse_headers<'a, I>(lines: I) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    const SINGLE_VALUED: [&str; 4] = [
        "host",
        "sec-websocket-key",
        "sec-websocket-version",
        "sec-websocket-accept",
    ];

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_lowercase();
        if SINGLE_VALUED.contains(&name.as_str()) && headers.contains_key(&name) {
            return Err(Error::Handshake(format!("duplicate header: {name}")));
        }
        headers.insert(name, value.trim().to_string());
    }
    Ok(headers)
}

fn require<'a>(headers: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Handshake(format!("missing {name} header")))
}

/// The client's GET Upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request path.
    pub path: String,
    /// `Host` header value.
    pub host: String,
    /// `Sec-WebSocket-Key` nonce, already base64.
    pub key: String,
    /// `Sec-WebSocket-Protocol` offers, passed through opaquely.
    pub protocols: Vec<String>,
}

impl UpgradeRequest {
    /// Build a request with a caller-supplied nonce.
    #[must_use]
    pub fn new(host: impl Into<String>, path: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            key: key.into(),
            protocols: Vec::new(),
        }
    }

    /// Parse the request head (through the blank line) from raw bytes.
    ///
    /// # Errors
    ///
    /// [`Error::Handshake`] when the request line is not `GET ... HTTP/1.1`,
    /// a required header is missing or malformed, or the version is not 13.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::Handshake("request is not valid UTF-8".into()))?;
        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| Error::Handshake("empty request".into()))?;
        let mut parts = request_line.split_whitespace();
        let (method, path, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(p), Some(v)) => (m, p, v),
            _ => return Err(Error::Handshake("malformed request line".into())),
        };
        if method != "GET" {
            return Err(Error::Handshake(format!("method {method} is not GET")));
        }
        if !version.starts_with("HTTP/1.1") {
            return Err(Error::Handshake(format!("version {version} is not HTTP/1.1")));
        }

        let headers = parse_headers(lines)?;

        let upgrade = require(&headers, "upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::Handshake(format!("upgrade header is {upgrade:?}")));
        }
        let connection = require(&headers, "connection")?;
        if !connection.to_lowercase().contains("upgrade") {
            return Err(Error::Handshake(format!(
                "connection header is {connection:?}"
            )));
        }
        let ws_version = require(&headers, "sec-websocket-version")?;
        if ws_version != "13" {
            return Err(Error::Handshake(format!(
                "unsupported websocket version {ws_version}"
            )));
        }

        let key = require(&headers, "sec-websocket-key")?.to_string();
        if BASE64.decode(&key).map(|k| k.len()) != Ok(16) {
            return Err(Error::Handshake("sec-websocket-key is not 16 bytes".into()));
        }

        let protocols = headers
            .get("sec-websocket-protocol")
            .map(|p| p.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_string(),
            host: require(&headers, "host")?.to_string(),
            key,
            protocols,
        })
    }

    /// Serialize the request head, terminator included.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        out.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        out.extend_from_slice(b"Connection: Upgrade\r\n");
        out.extend_from_slice(b"Upgrade: websocket\r\n");
        out.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
        out.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        if !self.protocols.is_empty() {
            out.extend_from_slice(
                format!("Sec-WebSocket-Protocol: {}\r\n", self.protocols.join(", ")).as_bytes(),
            );
        }
        out.extend_from_slice(b"\r\n");
    }
}

/// The server's `101 Switching Protocols` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// `Sec-WebSocket-Accept` value.
    pub accept: String,
    /// Selected subprotocol, echoed opaquely.
    pub protocol: Option<String>,
}

impl UpgradeResponse {
    /// Build the response answering `req`.
    #[must_use]
    pub fn for_request(req: &UpgradeRequest) -> Self {
        Self {
            accept: accept_key(&req.key),
            protocol: req.protocols.first().cloned(),
        }
    }

    /// Parse the response head from raw bytes.
    ///
    /// # Errors
    ///
    /// [`Error::Handshake`] when the status is not 101 or a required header
    /// is missing or malformed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::Handshake("response is not valid UTF-8".into()))?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::Handshake("empty response".into()))?;
        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::Handshake(format!(
                "did not switch protocols: {status_line:?}"
            )));
        }

        let headers = parse_headers(lines)?;

        let upgrade = require(&headers, "upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::Handshake(format!("upgrade header is {upgrade:?}")));
        }
        let connection = require(&headers, "connection")?;
        if !connection.to_lowercase().contains("upgrade") {
            return Err(Error::Handshake(format!(
                "connection header is {connection:?}"
            )));
        }

        Ok(Self {
            accept: require(&headers, "sec-websocket-accept")?.to_string(),
            protocol: headers.get("sec-websocket-protocol").cloned(),
        })
    }

    /// Serialize the response head, terminator included.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        out.extend_from_slice(b"Upgrade: websocket\r\n");
        out.extend_from_slice(b"Connection: Upgrade\r\n");
        out.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        if let Some(ref proto) = self.protocol {
            out.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
    }
}
