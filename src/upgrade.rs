//! Handshake I/O: drive the HTTP/1.1 upgrade over a byte stream and hand
//! back a framed connection.
//!
//! Bytes the head reader pulls past the `\r\n\r\n` terminator are frame
//! bytes the peer sent early; they are transplanted into the connection's
//! read buffer so the first frame parse sees them.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::protocol::handshake::{accept_key, UpgradeRequest, UpgradeResponse};

/// Upper bound on the handshake head.
const MAX_HANDSHAKE: usize = 8192;

/// Accept an upgrade request on `io` and return the server-role connection.
///
/// # Errors
///
/// [`Error::Handshake`] when the request is not a well-formed WebSocket
/// upgrade; transport errors pass through.
pub async fn accept<T>(mut io: T, config: Config) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (head, trailing) = read_head(&mut io).await?;
    let request = UpgradeRequest::parse(&head)?;

    let mut response = Vec::with_capacity(256);
    UpgradeResponse::for_request(&request).write(&mut response);
    io.write_all(&response).await?;
    io.flush().await?;

    debug!(path = %request.path, "accepted websocket upgrade");
    Ok(Connection::with_buffered(io, Role::Server, config, &trailing))
}

/// Upgrade `io` as a client against `host` and `path` and return the
/// client-role connection.
///
/// # Errors
///
/// [`Error::Handshake`] when the server does not switch protocols or its
/// accept key does not match; transport errors pass through.
pub async fn connect<T>(mut io: T, host: &str, path: &str, config: Config) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(std::io::Error::from)?;
    let key = BASE64.encode(nonce);

    let mut request = Vec::with_capacity(256);
    UpgradeRequest::new(host, path, key.clone()).write(&mut request);
    io.write_all(&request).await?;
    io.flush().await?;

    let (head, trailing) = read_head(&mut io).await?;
    let response = UpgradeResponse::parse(&head)?;
    if response.accept != accept_key(&key) {
        return Err(Error::Handshake("sec-websocket-accept mismatch".into()));
    }

    debug!(host, path, "websocket upgrade complete");
    Ok(Connection::with_buffered(io, Role::Client, config, &trailing))
}

/// Split a `ws://` URL into the dial address, the `Host` header value, and
/// the request path.
///
/// # Errors
///
/// [`Error::Handshake`] for other schemes. `wss://` is called out
/// explicitly: TLS belongs to the transport, dial it first and use
/// [`connect`] on the encrypted stream.
pub fn split_url(url: &str) -> Result<(String, String, String)> {
    let Some(rest) = url.strip_prefix("ws://") else {
        if url.starts_with("wss://") {
            return Err(Error::Handshake(
                "wss:// needs a TLS transport; dial it first, then use connect()".into(),
            ));
        }
        return Err(Error::Handshake(format!("unsupported url scheme in {url:?}")));
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(Error::Handshake(format!("missing host in {url:?}")));
    }

    let addr = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };
    Ok((addr, authority.to_string(), path.to_string()))
}

/// Read until the CRLFCRLF terminator; returns the head (terminator
/// included) and the trailing bytes already pulled off the transport.
async fn read_head<T: AsyncRead + Unpin>(io: &mut T) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        if let Some(pos) = find_terminator(&buf) {
            let trailing = buf.split_off(pos + 4);
            return Ok((buf, trailing));
        }
        if buf.len() > MAX_HANDSHAKE {
            return Err(Error::Handshake("handshake head too large".into()));
        }
        let n = io.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Handshake("end of stream during handshake".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
