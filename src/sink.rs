//! Sink: write batches of records out of the pipeline.
//!
//! The sink function sees a whole batch at once and answers every record in
//! it with a [`Response`]. Responses may come back in any order; they are
//! matched to records by id. If the function itself fails, every record of
//! the batch is reported as failed with the error text and the channel stays
//! open for the next batch.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_bytes::ByteBuf;
use tracing::warn;

use crate::bridge::batch::BatchCall;
use crate::config::ServerConfig;
use crate::error::{HandlerResult, Result};
use crate::message::{Datum, Message};
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION};
use crate::shape::{Method, Shape};
use crate::wire::{BatchResult, MessageBody, SinkResult, SinkStatus};

pub const SOCKET_PATH: &str = "/var/run/numaflow/sink.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/sinker-server-info";
pub const FALLBACK_SOCKET_PATH: &str = "/var/run/numaflow/fb-sink.sock";
pub const FALLBACK_SERVER_INFO_PATH: &str = "/var/run/numaflow/fb-sinker-server-info";

pub const SINK: Method = Method::streaming("sink", 2);

/// Outcome for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    pub status: SinkStatus,
    pub err: Option<String>,
    pub serve_response: Option<Vec<u8>>,
    pub on_success_msg: Option<Message>,
}

impl Response {
    fn with_status(id: String, status: SinkStatus) -> Self {
        Self {
            id,
            status,
            err: None,
            serve_response: None,
            on_success_msg: None,
        }
    }

    /// The record was written.
    pub fn ok(id: String) -> Self {
        Self::with_status(id, SinkStatus::Success)
    }

    /// The record could not be written; the engine retries it.
    pub fn failure(id: String, err: impl Into<String>) -> Self {
        Self {
            err: Some(err.into()),
            ..Self::with_status(id, SinkStatus::Failure)
        }
    }

    /// Send the record to the fallback sink.
    pub fn fallback(id: String) -> Self {
        Self::with_status(id, SinkStatus::Fallback)
    }

    /// Answer the record with a payload for the serving store.
    pub fn serve(id: String, payload: Vec<u8>) -> Self {
        Self {
            serve_response: Some(payload),
            ..Self::with_status(id, SinkStatus::Serve)
        }
    }

    /// Written; forward `msg` (or the original record when `None`) to the on-success sink.
    pub fn on_success(id: String, msg: Option<Message>) -> Self {
        Self {
            on_success_msg: msg,
            ..Self::with_status(id, SinkStatus::OnSuccess)
        }
    }
}

impl From<Response> for SinkResult {
    fn from(resp: Response) -> Self {
        Self {
            id: resp.id,
            status: resp.status,
            err_msg: resp.err,
            serve_response: resp.serve_response.map(ByteBuf::from),
            on_success_msg: resp.on_success_msg.map(MessageBody::from),
        }
    }
}

/// A sink function.
pub trait Sinker: Send + Sync + 'static {
    fn sink(&self, batch: Vec<Datum>) -> BoxFuture<'_, HandlerResult<Vec<Response>>>;
}

impl<F, Fut> Sinker for F
where
    F: Fn(Vec<Datum>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Vec<Response>>> + Send + 'static,
{
    fn sink(&self, batch: Vec<Datum>) -> BoxFuture<'_, HandlerResult<Vec<Response>>> {
        Box::pin(self(batch))
    }
}

struct SinkCall<S>(S);

impl<S: Sinker> BatchCall for SinkCall<S> {
    fn call(&self, batch: Vec<Datum>) -> BoxFuture<'_, Result<Vec<BatchResult>>> {
        Box::pin(async move {
            let ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();
            let responses = match self.0.sink(batch).await {
                Ok(responses) => responses,
                Err(e) => {
                    let err = e.to_string();
                    warn!(error = %err, records = ids.len(), "sink failed, failing whole batch");
                    ids.into_iter()
                        .map(|id| Response::failure(id, err.clone()))
                        .collect()
                }
            };
            Ok(responses
                .into_iter()
                .map(|r| BatchResult::Sink(r.into()))
                .collect())
        })
    }
}

fn build<S: Sinker>(sinker: S, config: ServerConfig) -> Server {
    let shape = Shape::Batch {
        method: SINK,
        call: Arc::new(SinkCall(sinker)),
    };
    Server::new(shape, config, ServerInfo::new(MINIMUM_NUMAFLOW_VERSION))
}

/// Server for `sinker` on the default sink socket.
pub fn server<S: Sinker>(sinker: S) -> Server {
    build(sinker, ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH))
}

/// Server for `sinker` acting as the fallback sink.
pub fn fallback_server<S: Sinker>(sinker: S) -> Server {
    build(
        sinker,
        ServerConfig::new(FALLBACK_SOCKET_PATH, FALLBACK_SERVER_INFO_PATH),
    )
}
