//! A complete frame: header plus payload.

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn method_id(&self) -> u16 {
        self.header.method_id
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    #[inline]
    pub fn is_handshake(&self) -> bool {
        self.header.is_handshake()
    }

    #[inline]
    pub fn is_eot(&self) -> bool {
        self.header.is_eot()
    }
}

/// Build a complete frame as a single byte vector.
///
/// ```
/// use streamfn::protocol::{build_frame, flags, Header};
///
/// let header = Header::new(2, flags::RESPONSE, 42, 5);
/// assert_eq!(build_frame(&header, b"hello").len(), 11 + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{flags, FrameBuffer};

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(Header::new(2, flags::EOT, 42, 0), Bytes::new());

        assert_eq!(frame.method_id(), 2);
        assert_eq!(frame.request_id(), 42);
        assert!(frame.is_eot());
        assert!(!frame.is_handshake());
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_build_frame_parses_back() {
        let header = Header::new(3, flags::HANDSHAKE, 456, 10);
        let bytes = build_frame(&header, b"0123456789");

        let mut buffer = FrameBuffer::new(1024);
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header, header);
        assert_eq!(frames[0].payload(), b"0123456789");
        assert!(frames[0].is_handshake());
    }
}
