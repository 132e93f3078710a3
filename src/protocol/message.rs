//! Reload command definition
//!
//! Payload layout:
//!
//! ```text
//! key_len: i32            number of UTF-16 code units in the key
//! key:     [u8; 2*key_len] UTF-16 little-endian, no terminator
//! asset:   [u8; *]        raw effect bytes, up to the end of the frame
//! ```

use bytes::{BufMut, BytesMut};

use super::{CodecError, CodecResult, KEY_LENGTH_SIZE, MAX_PAYLOAD_SIZE};

/// Asks the viewer to replace the effect registered under `key` with `asset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadCommand<'a> {
    key: &'a str,
    asset: &'a [u8],
}

impl<'a> ReloadCommand<'a> {
    pub fn new(key: &'a str, asset: &'a [u8]) -> Self {
        Self { key, asset }
    }

    /// UTF-16 code units of the key, stopping at the first NUL.
    pub fn key_units(&self) -> impl Iterator<Item = u16> + 'a {
        self.key.encode_utf16().take_while(|&unit| unit != 0)
    }

    /// Number of UTF-16 code units sent for the key
    pub fn key_len(&self) -> usize {
        self.key_units().count()
    }

    /// Total payload size in bytes
    pub fn encoded_len(&self) -> usize {
        KEY_LENGTH_SIZE + self.key_len() * 2 + self.asset.len()
    }

    /// Append the payload to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
        let key_len = self.key_len();
        if key_len > i32::MAX as usize {
            return Err(CodecError::KeyTooLong(key_len));
        }

        let total = self.encoded_len();
        if total > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge(total, MAX_PAYLOAD_SIZE));
        }

        buf.reserve(total);
        buf.put_i32_le(key_len as i32);
        for unit in self.key_units() {
            buf.put_u16_le(unit);
        }
        buf.put_slice(self.asset);
        Ok(())
    }
}
