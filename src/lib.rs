//! # wsframe - Minimal WebSocket Framing
//!
//! `wsframe` is an allocation-frugal WebSocket (RFC 6455, version 13)
//! endpoint library. It upgrades an HTTP/1.1 stream to a full-duplex framed
//! byte stream and exchanges text/binary frames with the peer while
//! handling control frames, masking, fragmentation, and closure.
//!
//! ## What it is, and is not
//!
//! The unit of exchange is the *frame*. Payloads stream through
//! caller-supplied buffers with in-place unmasking; fragmented messages are
//! delivered fragment by fragment and reassembly is the caller's choice.
//! There is no extension negotiation, no UTF-8 validation of text payloads,
//! and no TLS (bring an encrypted transport instead).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use wsframe::{upgrade, Config, OpCode};
//!
//! // Client side, over a connected TcpStream:
//! let conn = upgrade::connect(stream, "example.com", "/chat", Config::new()).await?;
//! conn.write_frame(b"hello", OpCode::Text, true).await?;
//!
//! let mut buf = [0u8; 4096];
//! loop {
//!     let n = conn.read(&mut buf).await?;
//!     if n == 0 {
//!         break; // peer closed
//!     }
//!     println!("{:?}", &buf[..n]);
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod upgrade;

pub use config::Config;
pub use connection::{Connection, Frame, Role};
pub use error::{Error, Result};
pub use protocol::{OpCode, NORMAL_CLOSURE};
