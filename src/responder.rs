//! Typed frame writers bound to one channel's method.
//!
//! A [`Responder`] turns bodies into frames that echo the method ID of the
//! channel and the request ID they answer:
//! - `handshake` - echo the handshake
//! - `respond` - one MsgPack-encoded response frame
//! - `eot` - end-of-transmission marker (empty payload)
//! - `error` - error frame carrying a message string

use bytes::Bytes;

use crate::codec::MsgPackCodec;
use crate::error::{Error, Result};
use crate::protocol::{flags, Header};
use crate::wire::HandshakeBody;
use crate::writer::{OutboundFrame, WriterHandle};

/// Writes response frames for one channel. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Responder {
    method_id: u16,
    writer: WriterHandle,
}

impl Responder {
    pub(crate) fn new(method_id: u16, writer: WriterHandle) -> Self {
        Self { method_id, writer }
    }

    /// Rebind to the method the channel turned out to serve.
    pub(crate) fn for_method(&self, method_id: u16) -> Self {
        Self {
            method_id,
            writer: self.writer.clone(),
        }
    }

    #[inline]
    pub fn method_id(&self) -> u16 {
        self.method_id
    }

    pub async fn handshake(&self, request_id: u32) -> Result<()> {
        self.respond_with(flags::HANDSHAKE_RESPONSE, request_id, &HandshakeBody { sot: true })
            .await
    }

    pub async fn respond<T: serde::Serialize>(&self, request_id: u32, body: &T) -> Result<()> {
        self.respond_with(flags::RESPONSE, request_id, body).await
    }

    /// Send an already-encoded body.
    pub async fn respond_bytes(&self, request_id: u32, payload: Bytes) -> Result<()> {
        self.send_frame(flags::RESPONSE, request_id, payload).await
    }

    pub async fn eot(&self, request_id: u32) -> Result<()> {
        self.send_frame(flags::EOT_RESPONSE, request_id, Bytes::new())
            .await
    }

    pub async fn error(&self, request_id: u32, message: &str) -> Result<()> {
        self.respond_with(flags::ERROR_RESPONSE, request_id, &message)
            .await
    }

    async fn respond_with<T: serde::Serialize>(
        &self,
        flags: u8,
        request_id: u32,
        body: &T,
    ) -> Result<()> {
        let data = MsgPackCodec::encode(body)?;
        self.send_frame(flags, request_id, Bytes::from(data)).await
    }

    async fn send_frame(&self, flags: u8, request_id: u32, payload: Bytes) -> Result<()> {
        let header = Header::new(self.method_id, flags, request_id, frame_length(payload.len())?);
        self.writer.send(OutboundFrame::new(&header, payload)).await
    }
}

/// Payload length as carried in the header.
fn frame_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::MessageTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HEADER_SIZE;
    use crate::writer::{spawn_writer_task, WriterConfig};
    use tokio::io::{duplex, AsyncReadExt};

    async fn written(f: impl FnOnce(Responder) -> futures::future::BoxFuture<'static, ()>) -> Vec<u8> {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());
        f(Responder::new(3, handle)).await;
        task.await.unwrap().unwrap();
        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_eot_has_empty_payload() {
        let bytes = written(|r| Box::pin(async move { r.eot(9).await.unwrap() })).await;

        let header = Header::decode(&bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(header.method_id, 3);
        assert_eq!(header.flags, flags::EOT_RESPONSE);
        assert_eq!(header.request_id, 9);
    }

    #[tokio::test]
    async fn test_handshake_echo_body() {
        let bytes = written(|r| Box::pin(async move { r.handshake(1).await.unwrap() })).await;

        let header = Header::decode(&bytes).unwrap();
        assert!(header.is_handshake());
        let body: HandshakeBody = MsgPackCodec::decode(&bytes[HEADER_SIZE..]).unwrap();
        assert!(body.sot);
    }

    #[tokio::test]
    async fn test_error_frame_carries_message() {
        let bytes = written(|r| {
            Box::pin(async move { r.for_method(5).error(4, "boom").await.unwrap() })
        })
        .await;

        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.method_id, 5);
        assert!(header.is_error());
        let message: String = MsgPackCodec::decode(&bytes[HEADER_SIZE..]).unwrap();
        assert_eq!(message, "boom");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_frame_length_beyond_header_range_is_refused() {
        assert_eq!(frame_length(0).unwrap(), 0);
        assert_eq!(frame_length(u32::MAX as usize).unwrap(), u32::MAX);

        let err = frame_length(u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(
            err,
            Error::MessageTooLarge { size, max } if size == u32::MAX as usize + 1 && max == u32::MAX as usize
        ));
    }
}
