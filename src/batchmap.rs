//! Batch map: map a whole batch of records in one call.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::bridge::batch::BatchCall;
use crate::config::ServerConfig;
use crate::error::{Error, HandlerResult, Result};
use crate::message::{Datum, Message};
use crate::server::Server;
use crate::server_info::{ServerInfo, MAP_MODE_KEY, MINIMUM_NUMAFLOW_VERSION};
use crate::shape::{Method, Shape};
use crate::wire::{BatchResult, MapResponse, MessageBody};

pub const SOCKET_PATH: &str = "/var/run/numaflow/map.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/mapper-server-info";

pub const BATCH_MAP: Method = Method::streaming("batch_map", 2);

/// Messages produced for one record of the batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResponse {
    pub id: String,
    pub messages: Vec<Message>,
}

impl BatchResponse {
    /// An empty response for the record with `id`.
    pub fn from_id(id: String) -> Self {
        Self {
            id,
            messages: Vec::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// A batch map function; must answer every record of the batch exactly once.
pub trait BatchMapper: Send + Sync + 'static {
    fn batch_map(&self, batch: Vec<Datum>) -> BoxFuture<'_, HandlerResult<Vec<BatchResponse>>>;
}

impl<F, Fut> BatchMapper for F
where
    F: Fn(Vec<Datum>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Vec<BatchResponse>>> + Send + 'static,
{
    fn batch_map(&self, batch: Vec<Datum>) -> BoxFuture<'_, HandlerResult<Vec<BatchResponse>>> {
        Box::pin(self(batch))
    }
}

struct BatchMapCall<B>(B);

impl<B: BatchMapper> BatchCall for BatchMapCall<B> {
    fn call(&self, batch: Vec<Datum>) -> BoxFuture<'_, Result<Vec<BatchResult>>> {
        Box::pin(async move {
            let responses = self.0.batch_map(batch).await.map_err(Error::user)?;
            Ok(responses
                .into_iter()
                .map(|r| {
                    BatchResult::Map(MapResponse {
                        id: r.id,
                        results: r.messages.into_iter().map(MessageBody::from).collect(),
                    })
                })
                .collect())
        })
    }
}

pub fn server<B: BatchMapper>(mapper: B) -> Server {
    let shape = Shape::Batch {
        method: BATCH_MAP,
        call: Arc::new(BatchMapCall(mapper)),
    };
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION).with_metadata(MAP_MODE_KEY, "batch-map"),
    )
}
