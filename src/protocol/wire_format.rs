//! Frame header layout.
//!
//! Every frame on a channel starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Method ID│ Flags │ Req ID   │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The payload that follows is a
//! MsgPack map, except for EOT frames whose payload is empty.

use crate::error::{Error, Result};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Default maximum message size (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Smallest maximum message size a server accepts.
pub const MIN_MAX_MESSAGE_SIZE: usize = 512;

/// Reserved method ID (never use).
pub const RESERVED_METHOD_ID: u16 = 0;

/// Flag bits carried in the header.
pub mod flags {
    /// Frame travels from the bridge to the engine.
    pub const TO_ENGINE: u8 = 0b0000_0001;
    /// Handshake frame (start of a streaming channel).
    pub const HANDSHAKE: u8 = 0b0000_0010;
    /// End-of-transmission marker; payload is empty.
    pub const EOT: u8 = 0b0000_0100;
    /// Error frame; payload is a MsgPack string.
    pub const ERROR: u8 = 0b0000_1000;

    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0b1111_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Plain response: 0x01
    pub const RESPONSE: u8 = TO_ENGINE;
    /// Handshake echo: 0x03
    pub const HANDSHAKE_RESPONSE: u8 = TO_ENGINE | HANDSHAKE;
    /// EOT marker sent by the bridge: 0x05
    pub const EOT_RESPONSE: u8 = TO_ENGINE | EOT;
    /// Error report: 0x09
    pub const ERROR_RESPONSE: u8 = TO_ENGINE | ERROR;
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Method identifier (0 reserved).
    pub method_id: u16,
    /// Flags byte (see [`flags`]).
    pub flags: u8,
    /// Request identifier; responses echo the request they answer.
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(method_id: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            method_id,
            flags,
            request_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// ```
    /// use streamfn::protocol::{flags, Header};
    ///
    /// let header = Header::new(2, flags::RESPONSE, 42, 100);
    /// assert_eq!(header.encode().len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.method_id.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            method_id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Validate an inbound header.
    ///
    /// Rejects the reserved method ID, reserved flag bits, frames that claim
    /// to come from the bridge, and payloads above `max_message_size`.
    pub fn validate(&self, max_message_size: usize) -> Result<()> {
        if self.method_id == RESERVED_METHOD_ID {
            return Err(Error::Protocol("Method ID 0 is reserved".to_string()));
        }

        if self.payload_length as usize > max_message_size {
            return Err(Error::MessageTooLarge {
                size: self.payload_length as usize,
                max: max_message_size,
            });
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(Error::Protocol("Reserved flag bits must be 0".to_string()));
        }

        if self.is_to_engine() {
            return Err(Error::Protocol(
                "Inbound frame carries the TO_ENGINE flag".to_string(),
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn is_handshake(&self) -> bool {
        flags::has_flag(self.flags, flags::HANDSHAKE)
    }

    #[inline]
    pub fn is_eot(&self) -> bool {
        flags::has_flag(self.flags, flags::EOT)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::ERROR)
    }

    #[inline]
    pub fn is_to_engine(&self) -> bool {
        flags::has_flag(self.flags, flags::TO_ENGINE)
    }
}
