//! WebSocket wire protocol (RFC 6455): header codec, masking, opcodes, and
//! the HTTP/1.1 upgrade.

pub mod handshake;
pub mod header;
pub mod mask;
pub mod opcode;

pub use handshake::{accept_key, UpgradeRequest, UpgradeResponse, WS_GUID};
pub use header::HeaderBits;
pub use mask::apply_mask;
pub use opcode::OpCode;

/// Status code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;
