//! Wire codec
//!
//! Frame layout:
//! ```text
//! +----------------+----------------+------------------+
//! | correlation id | body size      | body             |
//! | (u32, native)  | (u32, native)  | (body size bytes)|
//! +----------------+----------------+------------------+
//! ```
//!
//! There is no magic number and no version byte. Both ends must agree on the
//! layout and byte order out of band, and a header read from a peer that does
//! not speak this protocol decodes to garbage without any error. Callers must
//! not treat a successful decode as content validation.
//!
//! Before the first frame, a client sends its nickname as a raw
//! `IDENTITY_LEN`-byte buffer, NUL padded, with no length prefix.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::message::{Message, MessageHeader};

/// Encoded header size: two u32 fields, no padding
pub const HEADER_LEN: usize = 8;

/// Size of the nickname buffer sent once at connect time
pub const IDENTITY_LEN: usize = 32;

/// Encode just the header
pub fn encode_header(header: &MessageHeader) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[..4].copy_from_slice(&header.id.to_ne_bytes());
    buf[4..].copy_from_slice(&header.size.to_ne_bytes());
    buf
}

/// Encode a whole frame: header bytes immediately followed by the body
pub fn encode(message: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + message.body.len());
    buf.put_slice(&encode_header(&message.header));
    buf.put_slice(&message.body);
    buf.freeze()
}

/// Decode a header from exactly `HEADER_LEN` bytes
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, CodecError> {
    let raw: [u8; HEADER_LEN] = bytes.try_into().map_err(|_| CodecError::HeaderLength {
        expected: HEADER_LEN,
        actual: bytes.len(),
    })?;
    let [a, b, c, d, e, f, g, h] = raw;
    Ok(MessageHeader {
        id: u32::from_ne_bytes([a, b, c, d]),
        size: u32::from_ne_bytes([e, f, g, h]),
    })
}

/// Take exactly `size` bytes as a body
pub fn decode_body(bytes: &[u8], size: usize) -> Result<Bytes, CodecError> {
    if bytes.len() != size {
        return Err(CodecError::BodyLength {
            expected: size,
            actual: bytes.len(),
        });
    }
    Ok(Bytes::copy_from_slice(bytes))
}

/// Build the fixed nickname buffer
///
/// Longer nicknames are cut to `IDENTITY_LEN` bytes.
pub fn encode_identity(nickname: &str) -> Bytes {
    let mut buf = [0u8; IDENTITY_LEN];
    let raw = nickname.as_bytes();
    let n = raw.len().min(IDENTITY_LEN);
    buf[..n].copy_from_slice(&raw[..n]);
    Bytes::copy_from_slice(&buf)
}

/// Read a nickname back out of its buffer
///
/// Stops at the first NUL. Invalid UTF-8 (including a multi-byte character
/// cut by truncation) is replaced rather than rejected.
pub fn decode_identity(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}
