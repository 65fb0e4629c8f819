//! Reduce stream: like reduce, but results are written while the group is
//! still open.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::bridge::stream::{
    encode_group_result, DatumStream, Emitter, GroupCall, GroupDriver, GroupKey,
};
use crate::config::ServerConfig;
use crate::error::{HandlerResult, Result};
use crate::message::Message;
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION};
use crate::shape::{Method, Shape};
use crate::wire::MessageBody;

pub use crate::reduce::{IntervalWindow, Metadata};

pub const SOCKET_PATH: &str = "/var/run/numaflow/reducestream.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/reducestreamer-server-info";

pub const REDUCE_STREAM: Method = Method::streaming("reduce_stream", 2);

/// A reduce stream function.
pub trait ReduceStreamer: Send + Sync + 'static {
    fn reduce_stream(
        &self,
        keys: Vec<String>,
        input: DatumStream,
        output: Emitter<Message>,
        md: Metadata,
    ) -> BoxFuture<'_, HandlerResult<()>>;
}

impl<F, Fut> ReduceStreamer for F
where
    F: Fn(Vec<String>, DatumStream, Emitter<Message>, Metadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    fn reduce_stream(
        &self,
        keys: Vec<String>,
        input: DatumStream,
        output: Emitter<Message>,
        md: Metadata,
    ) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(self(keys, input, output, md))
    }
}

struct ReduceStreamCall<R>(R);

impl<R: ReduceStreamer> GroupCall for ReduceStreamCall<R> {
    type Output = Message;

    fn invoke(
        self: Arc<Self>,
        key: GroupKey,
        input: DatumStream,
        output: Emitter<Message>,
    ) -> BoxFuture<'static, HandlerResult<()>> {
        Box::pin(async move {
            let md = Metadata::from_window(key.window);
            self.0.reduce_stream(key.keys, input, output, md).await
        })
    }

    fn encode(key: &GroupKey, output: Message) -> Result<Vec<u8>> {
        encode_group_result(key, MessageBody::from(output))
    }
}

pub fn server<R: ReduceStreamer>(streamer: R) -> Server {
    let shape = Shape::StreamingProducer {
        method: REDUCE_STREAM,
        driver: Arc::new(GroupDriver(Arc::new(ReduceStreamCall(streamer)))),
    };
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::testing::Engine;
    use crate::wire::{DatumBody, GroupRequest, GroupResponse};
    use serde_bytes::ByteBuf;

    fn request(value: &str) -> GroupRequest {
        GroupRequest {
            window: None,
            datum: DatumBody {
                keys: vec!["k".to_string()],
                value: ByteBuf::from(value.as_bytes().to_vec()),
                ..Default::default()
            },
        }
    }

    /// Emits the running count every second record.
    fn every_other() -> Server {
        server(
            |_keys: Vec<String>,
             mut input: DatumStream,
             output: Emitter<Message>,
             _md: Metadata| async move {
                let mut count = 0u32;
                while input.next().await.is_some() {
                    count += 1;
                    if count % 2 == 0 {
                        output.emit(Message::new(count.to_string().into_bytes())).await?;
                    }
                }
                Ok::<(), BoxError>(())
            },
        )
    }

    #[tokio::test]
    async fn test_results_written_before_group_closes() {
        let mut engine = Engine::open(every_other().shape(), REDUCE_STREAM.id).await;

        engine.send(&request("a")).await;
        engine.send(&request("b")).await;
        // group still open
        let partial: GroupResponse = engine.recv().await.body();
        assert_eq!(partial.result.value.as_slice(), b"2");
        assert_eq!(partial.keys, ["k"]);
        assert!(partial.window.is_none());

        engine.send(&request("c")).await;
        engine.send(&request("d")).await;
        engine.eot().await;

        let rest = engine.recv_until_eot().await;
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].body::<GroupResponse>().result.value.as_slice(), b"4");
        assert!(rest[1].is_eot());
    }

    #[tokio::test]
    async fn test_no_output_writes_only_eot() {
        let mut engine = Engine::open(every_other().shape(), REDUCE_STREAM.id).await;

        engine.send(&request("lonely")).await;
        engine.eot().await;
        let replies = engine.recv_until_eot().await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is_eot());
    }

    #[tokio::test]
    async fn test_user_error_reported_at_close() {
        let server = server(
            |_keys: Vec<String>, _input: DatumStream, _output: Emitter<Message>, _md: Metadata| async move {
                Err::<(), BoxError>("window exploded".into())
            },
        );
        let mut engine = Engine::open(server.shape(), REDUCE_STREAM.id).await;

        engine.send(&request("x")).await;
        engine.eot().await;
        let reply = engine.recv().await;
        assert!(reply.is_error());
        assert!(reply.body::<String>().contains("window exploded"));
    }
}
