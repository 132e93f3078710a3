//! Protocol codec for framing outbound payloads
//!
//! Every payload travels as `[length: i32][payload]`. The length counts the
//! payload bytes only. Integers are written little-endian. Viewers read
//! them in host byte order, so big-endian viewers are not supported.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{ReloadCommand, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),

    #[error("Key too long: {0} UTF-16 units")]
    KeyTooLong(usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Append a complete frame for `payload` to `buf`.
pub fn encode_frame(payload: &[u8], buf: &mut BytesMut) -> CodecResult<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len(), MAX_PAYLOAD_SIZE));
    }

    buf.reserve(FRAME_HEADER_SIZE + payload.len());
    buf.put_i32_le(payload.len() as i32);
    buf.put_slice(payload);
    Ok(())
}

/// Build a standalone frame for `payload`.
pub fn frame(payload: &[u8]) -> CodecResult<Bytes> {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    encode_frame(payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Length announced by a frame header.
pub fn frame_length(header: &[u8; FRAME_HEADER_SIZE]) -> i32 {
    i32::from_le_bytes(*header)
}

/// Build the reload command payload for `key` and `asset`.
///
/// The result is a frame *payload*; pass it to [`encode_frame`] (or
/// [`frame`]) before putting it on the wire.
pub fn encode_reload_command(key: &str, asset: &[u8]) -> CodecResult<Bytes> {
    let command = ReloadCommand::new(key, asset);
    let mut buf = BytesMut::with_capacity(command.encoded_len());
    command.encode(&mut buf)?;
    Ok(buf.freeze())
}
