//! Error types for WebSocket connections.
//!
//! The taxonomy distinguishes a clean end of stream from a close carrying a
//! status, protocol violations, transport failures, and cancellation.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The peer closed cleanly (Close with status 1000 or no status), or the
    /// transport reached end of stream between frames.
    ///
    /// Byte-stream readers never see this: [`Connection::read`] translates it
    /// to a zero-length read.
    ///
    /// [`Connection::read`]: crate::Connection::read
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer closed with a status other than 1000, or with a reason text.
    #[error("peer closed: status {code}, reason {reason:?}")]
    CloseStatus {
        /// The 16-bit close status code.
        code: u16,
        /// The UTF-8 reason, empty when the peer sent none.
        reason: String,
    },

    /// Close frame with a one-byte payload: a status code needs two.
    #[error("malformed close payload: {0:#04x}")]
    MalformedClose(u8),

    /// Reserved or unknown opcode on the wire.
    #[error("reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Declared payload length exceeds 2^62-1 or this platform's addressable
    /// range.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(u64),

    /// The transport accepted fewer bytes than one frame requires.
    #[error("short write")]
    ShortWrite,

    /// The caller's cancellation token fired while a read was blocked.
    #[error("operation cancelled")]
    Cancelled,

    /// The HTTP/1.1 upgrade failed.
    #[error("invalid handshake: {0}")]
    Handshake(String),

    /// Transport error, propagated untransformed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the peer ended the stream (cleanly or with a
    /// close status) rather than something going wrong locally.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed | Error::CloseStatus { .. })
    }

    /// The close status carried by the error, if any.
    #[must_use]
    pub fn close_status(&self) -> Option<u16> {
        match self {
            Error::CloseStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}
