//! Side input: values the engine broadcasts to every vertex of a pipeline.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde_bytes::ByteBuf;

use crate::codec::MsgPackCodec;
use crate::config::ServerConfig;
use crate::error::{Error, HandlerResult, Result};
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION};
use crate::session::Channel;
use crate::shape::{Method, MultiMethodService, Shape};
use crate::wire::SideInputResponse;

pub const SOCKET_PATH: &str = "/var/run/numaflow/sideinput.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/sideinput-server-info";

pub const RETRIEVE: Method = Method::unary("retrieve", 2);

static METHODS: [Method; 1] = [RETRIEVE];

/// Produces the current side-input value.
///
/// Returning `None` skips this broadcast.
pub trait SideInputRetriever: Send + Sync + 'static {
    fn retrieve_side_input(&self) -> BoxFuture<'_, HandlerResult<Option<Vec<u8>>>>;
}

impl<F, Fut> SideInputRetriever for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Option<Vec<u8>>>> + Send + 'static,
{
    fn retrieve_side_input(&self) -> BoxFuture<'_, HandlerResult<Option<Vec<u8>>>> {
        Box::pin(self())
    }
}

struct SideInputService<R>(R);

impl<R: SideInputRetriever> MultiMethodService for SideInputService<R> {
    fn methods(&self) -> &'static [Method] {
        &METHODS
    }

    fn stream<'a>(&'a self, method: Method, _channel: &'a mut Channel) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Err(Error::UnknownMethod(method.id)) })
    }

    fn unary(&self, _method: Method, _payload: Bytes) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            let value = self.0.retrieve_side_input().await.map_err(Error::user)?;
            let response = SideInputResponse {
                no_broadcast: value.is_none(),
                value: value.map(ByteBuf::from),
            };
            MsgPackCodec::encode(&response)
        })
    }
}

pub fn server<R: SideInputRetriever>(retriever: R) -> Server {
    let shape = Shape::MultiMethod(Arc::new(SideInputService(retriever)));
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Engine;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_every_other_retrieve_skips_broadcast() {
        let calls = Arc::new(AtomicU32::new(0));
        let server = server(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok((n % 2 == 0).then(|| format!("config-{n}").into_bytes())) }
        });
        let mut engine = Engine::connect(server.shape(), RETRIEVE.id);

        engine.send_raw(0, &[]).await;
        let first: SideInputResponse = engine.recv().await.body();
        assert!(!first.no_broadcast);
        assert_eq!(first.value.unwrap().as_slice(), b"config-0");

        engine.send_raw(0, &[]).await;
        let second: SideInputResponse = engine.recv().await.body();
        assert!(second.no_broadcast);
        assert!(second.value.is_none());
    }

    #[test]
    fn test_retrieve_is_unary() {
        let server = server(|| async { Ok(None) });
        assert_eq!(server.server_info().methods["retrieve"].response, "unary");
        assert_eq!(server.server_info().methods["ready"].id, 1);
    }
}
