//! Message definitions
//!
//! A message is a fixed header (correlation id + body size) followed by a raw
//! byte body. See `codec` for the wire layout.

use bytes::Bytes;

use crate::error::CodecError;

/// Fixed-size message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Correlation id. The server stamps broadcasts with the sender's
    /// connection id; clients number their own messages.
    pub id: u32,
    /// Number of body bytes that follow the header
    pub size: u32,
}

/// A complete message
///
/// `header.size == body.len()` for every message built through `Message::new`
/// or assembled by the read loop. A zero-size body is a header-only frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Message {
    /// Build a message, deriving the header size from the body
    ///
    /// # Panics
    /// If the body is longer than `u32::MAX` bytes. Use `try_new` for bodies
    /// of unknown size.
    pub fn new(id: u32, body: impl Into<Bytes>) -> Self {
        match Self::try_new(id, body) {
            Ok(message) => message,
            Err(e) => panic!("{}", e),
        }
    }

    /// Build a message, failing if the body cannot be described by the
    /// header's u32 size field
    pub fn try_new(id: u32, body: impl Into<Bytes>) -> Result<Self, CodecError> {
        let body = body.into();
        let size = body_size(body.len())?;
        Ok(Self {
            header: MessageHeader { id, size },
            body,
        })
    }

    /// Header-only message
    pub fn empty(id: u32) -> Self {
        Self::new(id, Bytes::new())
    }

    pub fn is_header_only(&self) -> bool {
        self.body.is_empty()
    }

    /// Body length in bytes
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Header size field for a body of `len` bytes
pub fn body_size(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::BodyTooLarge(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_size() {
        let msg = Message::new(3, "hello");
        assert_eq!(msg.header.id, 3);
        assert_eq!(msg.header.size, 5);
        assert_eq!(msg.len(), 5);
        assert!(!msg.is_header_only());
    }

    #[test]
    fn test_empty_is_header_only() {
        let msg = Message::empty(9);
        assert_eq!(msg.header.size, 0);
        assert!(msg.is_header_only());
    }

    #[test]
    fn test_body_size_limit() {
        assert_eq!(body_size(0), Ok(0));
        assert_eq!(body_size(u32::MAX as usize), Ok(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_body_size_rejects_oversized() {
        let len = u32::MAX as usize + 1;
        assert_eq!(body_size(len), Err(CodecError::BodyTooLarge(len)));
    }

    #[test]
    fn test_try_new_matches_new() {
        assert_eq!(Message::try_new(2, "abc"), Ok(Message::new(2, "abc")));
    }
}
