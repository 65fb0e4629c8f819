//! Frame buffer for accumulating partial reads.
//!
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 11 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! Every header is validated as soon as it is complete, so an oversize
//! frame is rejected before any of its payload is buffered.

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForPayload { header: Header, remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_message_size: usize,
}

impl FrameBuffer {
    /// Create a frame buffer that rejects payloads above `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns an error if a header is invalid or announces a payload larger
    /// than the configured maximum. The buffer must not be used afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let header = match Header::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };
                    header.validate(self.max_message_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.payload_length == 0 {
                        return Ok(Some(Frame::new(header, Bytes::new())));
                    }

                    self.state = State::WaitingForPayload {
                        header,
                        remaining: header.payload_length,
                    };
                }

                State::WaitingForPayload { header, remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame::new(header, payload)));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a frame has started arriving but is not complete.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{build_frame, flags, DEFAULT_MAX_MESSAGE_SIZE};

    fn frame_bytes(method_id: u16, flags: u8, request_id: u32, payload: &[u8]) -> Vec<u8> {
        build_frame(
            &Header::new(method_id, flags, request_id, payload.len() as u32),
            payload,
        )
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new(DEFAULT_MAX_MESSAGE_SIZE);
        let frames = buffer.push(&frame_bytes(2, 0, 42, b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].method_id(), 2);
        assert_eq!(frames[0].request_id(), 42);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new(DEFAULT_MAX_MESSAGE_SIZE);

        let mut combined = frame_bytes(2, flags::HANDSHAKE, 1, b"sot");
        combined.extend(frame_bytes(2, 0, 2, b"record"));
        combined.extend(frame_bytes(2, flags::EOT, 3, b""));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_handshake());
        assert_eq!(frames[1].payload(), b"record");
        assert!(frames[2].is_eot());
    }

    #[test]
    fn test_fragmented_header_and_payload() {
        let mut buffer = FrameBuffer::new(DEFAULT_MAX_MESSAGE_SIZE);
        let bytes = frame_bytes(2, 0, 42, b"a payload split across reads");

        assert!(buffer.push(&bytes[..5]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        assert!(buffer.push(&bytes[5..HEADER_SIZE]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");
        assert!(buffer.is_empty());
        assert!(buffer.has_partial());

        assert!(buffer.push(&bytes[HEADER_SIZE..HEADER_SIZE + 4]).unwrap().is_empty());

        let frames = buffer.push(&bytes[HEADER_SIZE + 4..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"a payload split across reads");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new(DEFAULT_MAX_MESSAGE_SIZE);
        let mut all = Vec::new();
        for byte in frame_bytes(1, 0, 9, b"hi") {
            all.extend(buffer.push(&[byte]).unwrap());
        }
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload(), b"hi");
    }

    #[test]
    fn test_oversize_payload_rejected_before_buffering() {
        let mut buffer = FrameBuffer::new(512);
        let header = Header::new(2, 0, 42, 1000).encode();

        let err = buffer.push(&header).unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { size: 1000, max: 512 }));
    }

    #[test]
    fn test_payload_at_limit_accepted() {
        let mut buffer = FrameBuffer::new(512);
        let frames = buffer.push(&frame_bytes(2, 0, 1, &[7u8; 512])).unwrap();
        assert_eq!(frames[0].payload().len(), 512);
    }
}
