//! Protocol module - Defines the wire protocol spoken to the effect viewer
//!
//! The protocol is send-only from the client's side:
//! - 4 bytes payload length (signed, little-endian)
//! - Variable length payload
//!
//! The only payload in use is the reload command, see [`ReloadCommand`].

mod codec;
mod message;

pub use codec::*;
pub use message::*;

/// Default port the effect viewer listens on
pub const DEFAULT_PORT: u16 = 60000;

/// Size of the frame length prefix
pub const FRAME_HEADER_SIZE: usize = 4;

/// Size of the key length field inside a reload command
pub const KEY_LENGTH_SIZE: usize = 4;

/// Largest payload a frame can announce (the length field is an `i32`)
pub const MAX_PAYLOAD_SIZE: usize = i32::MAX as usize;

/// Human readable name of the wire byte order
pub const BYTE_ORDER: &str = "little-endian";
