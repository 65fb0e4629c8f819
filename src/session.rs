//! Per-channel session state machine.
//!
//! A channel is bound to the method named by its first frame. Streaming
//! methods must open with a handshake, which is echoed before any data frame
//! is looked at; unary methods take plain request frames. After that every
//! frame is classified, in arrival order, as data or end-of-transmission.
//!
//! ```text
//!  Unbound ──first frame──► Bound ──handshake (streaming only)──► Active ──EOF──► Closed
//! ```

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::codec::MsgPackCodec;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameBuffer};
use crate::responder::Responder;
use crate::wire::HandshakeBody;

/// Read half of a channel's transport.
pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

const READ_CHUNK: usize = 64 * 1024;

/// How a method exchanges frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// One response frame per request frame, no handshake.
    Unary,
    /// Handshake first, then data and EOT frames.
    Streaming,
}

/// A classified inbound frame on an active channel.
#[derive(Debug)]
pub(crate) enum Inbound {
    Data { request_id: u32, payload: Bytes },
    Eot { request_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unbound,
    Bound,
    Active,
    Closed,
}

/// Handshake and binding state of one channel.
#[derive(Debug)]
pub(crate) struct Session {
    state: State,
    method_id: u16,
    cardinality: Cardinality,
}

impl Session {
    fn new() -> Self {
        Self {
            state: State::Unbound,
            method_id: 0,
            cardinality: Cardinality::Unary,
        }
    }

    fn bind(&mut self, method_id: u16, cardinality: Cardinality) {
        self.method_id = method_id;
        self.cardinality = cardinality;
        self.state = match cardinality {
            Cardinality::Unary => State::Active,
            Cardinality::Streaming => State::Bound,
        };
    }

    fn accept_handshake(&mut self, frame: &Frame) -> Result<()> {
        if self.state != State::Bound {
            return Err(Error::Protocol("unexpected handshake".to_string()));
        }
        if !frame.is_handshake() {
            return Err(Error::Handshake(
                "first frame of a streaming channel must be a handshake".to_string(),
            ));
        }
        let body: HandshakeBody = MsgPackCodec::decode(frame.payload())?;
        if !body.sot {
            return Err(Error::Handshake("handshake without sot".to_string()));
        }
        self.state = State::Active;
        Ok(())
    }

    fn classify(&self, frame: Frame) -> Result<Inbound> {
        if self.state != State::Active {
            return Err(Error::Handshake(
                "data frame before handshake".to_string(),
            ));
        }
        if frame.method_id() != self.method_id {
            return Err(Error::Protocol(format!(
                "frame for method {} on a channel bound to method {}",
                frame.method_id(),
                self.method_id
            )));
        }
        if frame.is_handshake() {
            return Err(Error::Protocol("unexpected handshake".to_string()));
        }
        if frame.header.is_error() {
            return Err(Error::Protocol("engine sent an error frame".to_string()));
        }

        let request_id = frame.request_id();
        match (frame.is_eot(), self.cardinality) {
            (true, Cardinality::Streaming) => Ok(Inbound::Eot { request_id }),
            (true, Cardinality::Unary) => Err(Error::Protocol(
                "EOT on a unary channel".to_string(),
            )),
            (false, _) => Ok(Inbound::Data {
                request_id,
                payload: frame.payload,
            }),
        }
    }
}

/// One open duplex channel: framed reads plus a [`Responder`] for writes.
pub struct Channel {
    reader: BoxedReader,
    buffer: FrameBuffer,
    pending: VecDeque<Frame>,
    read_buf: Vec<u8>,
    session: Session,
    responder: Responder,
    last_request_id: u32,
    queue_capacity: usize,
}

impl Channel {
    pub(crate) fn new(
        reader: BoxedReader,
        responder: Responder,
        max_message_size: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::new(max_message_size),
            pending: VecDeque::new(),
            read_buf: vec![0u8; READ_CHUNK],
            session: Session::new(),
            responder,
            last_request_id: 0,
            queue_capacity,
        }
    }

    /// Capacity for queues feeding user code on this channel.
    pub(crate) fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Writer for this channel, bound to its method.
    pub(crate) fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Request ID of the last frame read; error frames echo it.
    pub(crate) fn last_request_id(&self) -> u32 {
        self.last_request_id
    }

    /// Read the next raw frame. `None` once the engine closes its side.
    pub(crate) async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                self.last_request_id = frame.request_id();
                trace!(
                    method_id = frame.method_id(),
                    request_id = frame.request_id(),
                    flags = frame.header.flags,
                    len = frame.payload().len(),
                    "frame received"
                );
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                if self.buffer.has_partial() {
                    return Err(Error::Protocol(format!(
                        "channel closed inside a frame ({} bytes buffered)",
                        self.buffer.len()
                    )));
                }
                self.session.state = State::Closed;
                return Ok(None);
            }
            self.pending.extend(self.buffer.push(&self.read_buf[..n])?);
        }
    }

    /// Bind the channel to the method of its first frame.
    pub(crate) fn bind(&mut self, method_id: u16, cardinality: Cardinality) {
        self.session.bind(method_id, cardinality);
        self.responder = self.responder.for_method(method_id);
    }

    /// Validate the handshake and echo it.
    pub(crate) async fn complete_handshake(&mut self, first: Frame) -> Result<()> {
        self.session.accept_handshake(&first)?;
        self.responder.handshake(first.request_id()).await?;
        debug!(method_id = self.session.method_id, "handshake complete");
        Ok(())
    }

    /// Put a frame back so the next read returns it.
    pub(crate) fn unread(&mut self, frame: Frame) {
        self.pending.push_front(frame);
    }

    /// Next classified frame, or `None` once the engine closes the channel.
    pub(crate) async fn next(&mut self) -> Result<Option<Inbound>> {
        match self.read_frame().await? {
            Some(frame) => self.session.classify(frame).map(Some),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.session.state == State::Closed
    }
}
