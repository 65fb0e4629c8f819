//! Map stream: one record in, messages out as they are produced.
//!
//! Each emitted message is written immediately. When the function returns,
//! an EOT frame closes that record's results.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::bridge::stream::Emitter;
use crate::codec::MsgPackCodec;
use crate::config::ServerConfig;
use crate::error::{Error, HandlerResult, Result};
use crate::message::{Datum, Message};
use crate::server::Server;
use crate::server_info::{ServerInfo, MAP_MODE_KEY, MINIMUM_NUMAFLOW_VERSION};
use crate::session::{Channel, Inbound};
use crate::shape::{Method, ProducerDriver, Shape};
use crate::wire::{DatumBody, MessageBody};

pub const SOCKET_PATH: &str = "/var/run/numaflow/map.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/mapper-server-info";

pub const MAP_STREAM: Method = Method::streaming("map_stream", 2);

/// A map stream function.
///
/// ```ignore
/// streamfn::mapstream::server(
///     |_keys: Vec<String>, datum: Datum, output: Emitter<Message>| async move {
///         for part in datum.value.split(|b| *b == b',') {
///             output.emit(Message::new(part.to_vec())).await?;
///         }
///         Ok(())
///     },
/// );
/// ```
pub trait MapStreamer: Send + Sync + 'static {
    fn map_stream(
        &self,
        keys: Vec<String>,
        datum: Datum,
        output: Emitter<Message>,
    ) -> BoxFuture<'_, HandlerResult<()>>;
}

impl<F, Fut> MapStreamer for F
where
    F: Fn(Vec<String>, Datum, Emitter<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    fn map_stream(
        &self,
        keys: Vec<String>,
        datum: Datum,
        output: Emitter<Message>,
    ) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(self(keys, datum, output))
    }
}

struct MapStreamDriver<M>(M);

impl<M: MapStreamer> MapStreamDriver<M> {
    async fn run(&self, channel: &mut Channel) -> Result<()> {
        while let Some(inbound) = channel.next().await? {
            match inbound {
                Inbound::Data {
                    request_id,
                    payload,
                } => {
                    let datum = Datum::from(MsgPackCodec::decode::<DatumBody>(&payload)?);
                    let output = Emitter::new(channel.responder().clone(), request_id, |m: Message| {
                        MsgPackCodec::encode(&MessageBody::from(m))
                    });
                    let keys = datum.keys.clone();
                    self.0
                        .map_stream(keys, datum, output)
                        .await
                        .map_err(Error::user)?;
                    channel.responder().eot(request_id).await?;
                }
                Inbound::Eot { request_id } => {
                    debug!(request_id, "end of transmission");
                    channel.responder().eot(request_id).await?;
                }
            }
        }
        Ok(())
    }
}

impl<M: MapStreamer> ProducerDriver for MapStreamDriver<M> {
    fn drive<'a>(&'a self, channel: &'a mut Channel) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(channel))
    }
}

pub fn server<M: MapStreamer>(streamer: M) -> Server {
    let shape = Shape::StreamingProducer {
        method: MAP_STREAM,
        driver: Arc::new(MapStreamDriver(streamer)),
    };
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION).with_metadata(MAP_MODE_KEY, "stream-map"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::testing::Engine;
    use serde_bytes::ByteBuf;
    use tokio::sync::{mpsc, Mutex};

    fn record(value: &str) -> DatumBody {
        DatumBody {
            value: ByteBuf::from(value.as_bytes().to_vec()),
            ..Default::default()
        }
    }

    fn splitter() -> Server {
        server(
            |_keys: Vec<String>, datum: Datum, output: Emitter<Message>| async move {
                for part in datum.value.split(|b| *b == b',') {
                    output.emit(Message::new(part.to_vec())).await?;
                }
                Ok::<(), BoxError>(())
            },
        )
    }

    #[tokio::test]
    async fn test_each_yield_is_a_frame_before_eot() {
        let mut engine = Engine::open(splitter().shape(), MAP_STREAM.id).await;

        let request_id = engine.send(&record("a,b,c")).await;
        let replies = engine.recv_until_eot().await;

        let values: Vec<Vec<u8>> = replies[..3]
            .iter()
            .map(|r| r.body::<MessageBody>().value.into_vec())
            .collect();
        assert_eq!(values, [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(replies[3].is_eot());
        assert!(replies.iter().all(|r| r.header.request_id == request_id));
    }

    #[tokio::test]
    async fn test_no_yield_means_only_eot() {
        let server = server(
            |_keys: Vec<String>, _datum: Datum, _output: Emitter<Message>| async move {
                Ok::<(), BoxError>(())
            },
        );
        let mut engine = Engine::open(server.shape(), MAP_STREAM.id).await;

        engine.send(&record("ignored")).await;
        let replies = engine.recv_until_eot().await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is_eot());
    }

    #[tokio::test]
    async fn test_results_arrive_while_producer_runs() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>(1);
        let gate = Arc::new(Mutex::new(gate_rx));
        let server = server(
            move |_keys: Vec<String>, _datum: Datum, output: Emitter<Message>| {
                let gate = Arc::clone(&gate);
                async move {
                    output.emit(Message::new(b"early".to_vec())).await?;
                    gate.lock().await.recv().await;
                    output.emit(Message::new(b"late".to_vec())).await?;
                    Ok::<(), BoxError>(())
                }
            },
        );
        let mut engine = Engine::open(server.shape(), MAP_STREAM.id).await;

        engine.send(&record("x")).await;
        let first = engine.recv().await;
        assert_eq!(first.body::<MessageBody>().value.as_slice(), b"early");

        gate_tx.send(()).await.unwrap();
        assert_eq!(engine.recv().await.body::<MessageBody>().value.as_slice(), b"late");
        assert!(engine.recv().await.is_eot());
    }
}
