//! Reduce: fold the records of one keyed window into messages.
//!
//! The engine sends the records of a group followed by EOT. The reducer
//! sees them as a [`DatumStream`] together with the window, and its messages
//! are written once it returns, followed by EOT.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::bridge::stream::{
    encode_group_result, DatumStream, Emitter, GroupCall, GroupDriver, GroupKey,
};
use crate::codec::time::to_datetime;
use crate::config::ServerConfig;
use crate::error::{HandlerResult, Result};
use crate::message::Message;
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION};
use crate::shape::{Method, Shape};
use crate::wire::{MessageBody, WindowBody};

pub const SOCKET_PATH: &str = "/var/run/numaflow/reduce.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/reducer-server-info";

pub const REDUCE: Method = Method::streaming("reduce", 2);

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Window of the group being reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub interval_window: IntervalWindow,
}

impl Metadata {
    /// A missing window reads as `[epoch, epoch)`.
    pub(crate) fn from_window(window: Option<WindowBody>) -> Self {
        let (start, end) = match window {
            Some(w) => (Some(w.start), Some(w.end)),
            None => (None, None),
        };
        Self {
            interval_window: IntervalWindow {
                start: to_datetime(start),
                end: to_datetime(end),
            },
        }
    }
}

/// A reduce function.
pub trait Reducer: Send + Sync + 'static {
    fn reduce(
        &self,
        keys: Vec<String>,
        input: DatumStream,
        md: Metadata,
    ) -> BoxFuture<'_, HandlerResult<Vec<Message>>>;
}

impl<F, Fut> Reducer for F
where
    F: Fn(Vec<String>, DatumStream, Metadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Vec<Message>>> + Send + 'static,
{
    fn reduce(
        &self,
        keys: Vec<String>,
        input: DatumStream,
        md: Metadata,
    ) -> BoxFuture<'_, HandlerResult<Vec<Message>>> {
        Box::pin(self(keys, input, md))
    }
}

struct ReduceCall<R>(R);

impl<R: Reducer> GroupCall for ReduceCall<R> {
    type Output = Message;

    fn invoke(
        self: Arc<Self>,
        key: GroupKey,
        input: DatumStream,
        output: Emitter<Message>,
    ) -> BoxFuture<'static, HandlerResult<()>> {
        Box::pin(async move {
            let md = Metadata::from_window(key.window);
            let messages = self.0.reduce(key.keys, input, md).await?;
            for message in messages {
                output.emit(message).await?;
            }
            Ok(())
        })
    }

    fn encode(key: &GroupKey, output: Message) -> Result<Vec<u8>> {
        encode_group_result(key, MessageBody::from(output))
    }
}

pub fn server<R: Reducer>(reducer: R) -> Server {
    let shape = Shape::StreamingProducer {
        method: REDUCE,
        driver: Arc::new(GroupDriver(Arc::new(ReduceCall(reducer)))),
    };
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION),
    )
}
