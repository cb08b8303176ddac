//! Framed connections over byte-stream transports.
//!
//! [`Connection`] couples an incremental frame reader and a frame writer
//! over one transport, serialized per direction. Payloads stream through
//! caller-supplied buffers; nothing is reassembled on the caller's behalf.

mod cancel;
#[allow(clippy::module_inception)]
mod connection;
mod reader;
mod writer;

pub use connection::{Connection, Frame};

/// Which side of the connection this endpoint is.
///
/// Per RFC 6455, clients mask every outgoing frame with a fresh random key;
/// servers send unmasked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The side that initiated the upgrade. Masks egress frames.
    Client,
    /// The side that accepted the upgrade. Sends unmasked frames.
    Server,
}

impl Role {
    pub(crate) const fn masks_egress(self) -> bool {
        matches!(self, Role::Client)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_direction() {
        assert!(Role::Client.masks_egress());
        assert!(!Role::Server.masks_egress());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Server.to_string(), "server");
    }
}
