//! Engine side of a channel, for tests.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::codec::MsgPackCodec;
use crate::config::ServerConfig;
use crate::protocol::{build_frame, flags, Header, HEADER_SIZE};
use crate::server::serve_connection;
use crate::shape::Shape;
use crate::wire::HandshakeBody;

/// A frame written by the bridge.
#[derive(Debug)]
pub(crate) struct Reply {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Reply {
    pub fn body<T: DeserializeOwned>(&self) -> T {
        MsgPackCodec::decode(&self.payload).unwrap()
    }

    pub fn is_eot(&self) -> bool {
        self.header.flags == flags::EOT_RESPONSE
    }

    pub fn is_error(&self) -> bool {
        self.header.flags == flags::ERROR_RESPONSE
    }

    pub fn is_response(&self) -> bool {
        self.header.flags == flags::RESPONSE
    }
}

/// Drives one bridge channel over an in-memory duplex stream.
pub(crate) struct Engine {
    io: DuplexStream,
    method_id: u16,
    next_request_id: u32,
}

impl Engine {
    /// Serve `shape` on a fresh channel and talk to it as `method_id`.
    pub fn connect(shape: Arc<Shape>, method_id: u16) -> Self {
        Self::connect_with(shape, method_id, ServerConfig::default())
    }

    pub fn connect_with(shape: Arc<Shape>, method_id: u16, config: ServerConfig) -> Self {
        let (bridge, io) = duplex(1 << 20);
        tokio::spawn(serve_connection(bridge, shape, config));
        Self {
            io,
            method_id,
            next_request_id: 1,
        }
    }

    /// Connect and complete the handshake.
    pub async fn open(shape: Arc<Shape>, method_id: u16) -> Self {
        let mut engine = Self::connect(shape, method_id);
        engine.handshake().await;
        let echo = engine.recv().await;
        assert_eq!(echo.header.flags, flags::HANDSHAKE_RESPONSE);
        assert!(echo.body::<HandshakeBody>().sot);
        engine
    }

    fn request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub async fn send_raw(&mut self, flags: u8, payload: &[u8]) -> u32 {
        let request_id = self.request_id();
        let header = Header::new(self.method_id, flags, request_id, payload.len() as u32);
        self.io
            .write_all(&build_frame(&header, payload))
            .await
            .unwrap();
        request_id
    }

    pub async fn handshake(&mut self) -> u32 {
        let body = MsgPackCodec::encode(&HandshakeBody { sot: true }).unwrap();
        self.send_raw(flags::HANDSHAKE, &body).await
    }

    pub async fn send<T: Serialize>(&mut self, body: &T) -> u32 {
        let payload = MsgPackCodec::encode(body).unwrap();
        self.send_raw(0, &payload).await
    }

    pub async fn eot(&mut self) -> u32 {
        self.send_raw(flags::EOT, b"").await
    }

    /// Next frame from the bridge.
    pub async fn recv(&mut self) -> Reply {
        let mut head = [0u8; HEADER_SIZE];
        self.io.read_exact(&mut head).await.unwrap();
        let header = Header::decode(&head).unwrap();
        let mut payload = vec![0u8; header.payload_length as usize];
        self.io.read_exact(&mut payload).await.unwrap();
        Reply { header, payload }
    }

    /// Frames up to and including the next EOT.
    pub async fn recv_until_eot(&mut self) -> Vec<Reply> {
        let mut replies = Vec::new();
        loop {
            let reply = self.recv().await;
            let done = reply.is_eot() || reply.is_error();
            replies.push(reply);
            if done {
                return replies;
            }
        }
    }

    /// Stop sending; the bridge sees end of input.
    pub async fn close(&mut self) {
        self.io.shutdown().await.unwrap();
    }

    /// Whether the bridge has closed its side (no more frames).
    pub async fn is_closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.io.read(&mut byte).await, Ok(0))
    }
}
