//! Source: a user-implemented data source with several independent methods.
//!
//! The engine opens a channel per method it uses. `read`, `ack` and `nack`
//! are streaming channels (handshake first); `pending` and `partitions` are
//! unary.
//!
//! - `read` answers each request with the records read, one frame each,
//!   then EOT, even when nothing was read before the timeout. A read still
//!   running when the timeout expires is dropped; records it already emitted
//!   stay written.
//! - `ack` / `nack` answer each request with `{success: true}` once the user
//!   call completed. A failing call fails the channel; nothing is reported
//!   as acknowledged.
//! - `pending` answers `-1` when the count is unknown.
//! - `partitions` falls back to the replica's own partition when the source
//!   does not know its partitions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_bytes::ByteBuf;
use tracing::debug;

use crate::bridge::stream::Emitter;
use crate::codec::time::from_datetime;
use crate::codec::MsgPackCodec;
use crate::config::ServerConfig;
use crate::error::{Error, HandlerResult, Result};
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION};
use crate::session::{Channel, Inbound};
use crate::shape::{Method, MultiMethodService, Shape};
use crate::wire::{
    AckResponse, OffsetBody, OffsetsRequest, PartitionsResponse, PendingResponse, ReadRequestBody,
    ReadResultBody,
};

pub const SOCKET_PATH: &str = "/var/run/numaflow/source.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/sourcer-server-info";

pub const READ: Method = Method::streaming("read", 2);
pub const ACK: Method = Method::streaming("ack", 3);
pub const NACK: Method = Method::streaming("nack", 4);
pub const PENDING: Method = Method::unary("pending", 5);
pub const PARTITIONS: Method = Method::unary("partitions", 6);

static METHODS: [Method; 5] = [READ, ACK, NACK, PENDING, PARTITIONS];

/// How many records to read and how long to wait for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub count: usize,
    pub timeout: Duration,
}

impl From<ReadRequestBody> for ReadRequest {
    fn from(body: ReadRequestBody) -> Self {
        Self {
            count: usize::try_from(body.num_records).unwrap_or(usize::MAX),
            timeout: Duration::from_millis(body.timeout_ms),
        }
    }
}

/// Position of a record in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Offset {
    pub offset: Vec<u8>,
    pub partition_id: i32,
}

impl Offset {
    /// An offset on the default partition of `replica`.
    pub fn with_default_partition(offset: Vec<u8>, replica: i32) -> Self {
        Self {
            offset,
            partition_id: replica,
        }
    }
}

impl From<OffsetBody> for Offset {
    fn from(body: OffsetBody) -> Self {
        Self {
            offset: body.offset.into_vec(),
            partition_id: body.partition_id,
        }
    }
}

impl From<Offset> for OffsetBody {
    fn from(offset: Offset) -> Self {
        Self {
            offset: ByteBuf::from(offset.offset),
            partition_id: offset.partition_id,
        }
    }
}

/// A record produced by `read`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub value: Vec<u8>,
    pub offset: Offset,
    pub event_time: DateTime<Utc>,
    pub keys: Vec<String>,
    pub headers: HashMap<String, String>,
}

impl From<Message> for ReadResultBody {
    fn from(msg: Message) -> Self {
        Self {
            value: ByteBuf::from(msg.value),
            offset: msg.offset.into(),
            event_time: from_datetime(msg.event_time),
            keys: msg.keys,
            headers: msg.headers,
        }
    }
}

/// A user-defined source.
pub trait Sourcer: Send + Sync + 'static {
    /// Emit up to `request.count` records, waiting at most `request.timeout`.
    fn read(&self, request: ReadRequest, output: Emitter<Message>)
        -> BoxFuture<'_, HandlerResult<()>>;

    /// Acknowledge records that were processed.
    fn ack(&self, offsets: Vec<Offset>) -> BoxFuture<'_, HandlerResult<()>>;

    /// Return records for redelivery. Does nothing unless overridden.
    fn nack(&self, offsets: Vec<Offset>) -> BoxFuture<'_, HandlerResult<()>> {
        debug!(count = offsets.len(), "nack ignored");
        Box::pin(async { Ok(()) })
    }

    /// Records not yet read; `None` if unknown.
    fn pending(&self) -> BoxFuture<'_, HandlerResult<Option<u64>>>;

    /// Partitions this instance reads from; `None` for the replica's default.
    fn partitions(&self) -> BoxFuture<'_, HandlerResult<Option<Vec<i32>>>>;
}

struct SourceService<S> {
    sourcer: S,
    replica: i32,
}

fn decode_offsets(payload: &[u8]) -> Result<Vec<Offset>> {
    let request: OffsetsRequest = MsgPackCodec::decode(payload)?;
    Ok(request.offsets.into_iter().map(Offset::from).collect())
}

impl<S: Sourcer> SourceService<S> {
    async fn serve_stream(&self, method: Method, channel: &mut Channel) -> Result<()> {
        while let Some(inbound) = channel.next().await? {
            let (request_id, payload) = match inbound {
                Inbound::Data {
                    request_id,
                    payload,
                } => (request_id, payload),
                Inbound::Eot { request_id } => {
                    channel.responder().eot(request_id).await?;
                    continue;
                }
            };

            if method == READ {
                let request: ReadRequestBody = MsgPackCodec::decode(&payload)?;
                let output = Emitter::new(channel.responder().clone(), request_id, |m: Message| {
                    MsgPackCodec::encode(&ReadResultBody::from(m))
                });
                let request = ReadRequest::from(request);
                let timeout = request.timeout;
                match tokio::time::timeout(timeout, self.sourcer.read(request, output)).await {
                    Ok(read) => read.map_err(Error::user)?,
                    Err(_) => debug!(request_id, ?timeout, "read timed out, ending batch"),
                }
                channel.responder().eot(request_id).await?;
            } else {
                let offsets = decode_offsets(&payload)?;
                debug!(method = method.name, count = offsets.len(), "settling offsets");
                let settled = if method == ACK {
                    self.sourcer.ack(offsets).await
                } else {
                    self.sourcer.nack(offsets).await
                };
                settled.map_err(Error::user)?;
                channel
                    .responder()
                    .respond(request_id, &AckResponse { success: true })
                    .await?;
            }
        }
        Ok(())
    }

    async fn answer(&self, method: Method) -> Result<Vec<u8>> {
        if method == PENDING {
            let pending = self.sourcer.pending().await.map_err(Error::user)?;
            let count = pending.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
            MsgPackCodec::encode(&PendingResponse { count })
        } else {
            let partitions = self
                .sourcer
                .partitions()
                .await
                .map_err(Error::user)?
                .unwrap_or_else(|| vec![self.replica]);
            MsgPackCodec::encode(&PartitionsResponse { partitions })
        }
    }
}

impl<S: Sourcer> MultiMethodService for SourceService<S> {
    fn methods(&self) -> &'static [Method] {
        &METHODS
    }

    fn stream<'a>(
        &'a self,
        method: Method,
        channel: &'a mut Channel,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.serve_stream(method, channel))
    }

    fn unary(&self, method: Method, _payload: Bytes) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(self.answer(method))
    }
}

/// Server for `sourcer`, reporting partition 0 when it knows no partitions.
pub fn server<S: Sourcer>(sourcer: S) -> Server {
    server_for_replica(sourcer, 0)
}

/// Server for `sourcer` running as vertex replica `replica`.
pub fn server_for_replica<S: Sourcer>(sourcer: S, replica: i32) -> Server {
    let shape = Shape::MultiMethod(Arc::new(SourceService { sourcer, replica }));
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION),
    )
}
