//! Map: one record in, zero or more messages out.
//!
//! ```ignore
//! use streamfn::{map, Datum, Message};
//!
//! #[tokio::main]
//! async fn main() -> streamfn::Result<()> {
//!     map::server(|_keys: Vec<String>, datum: Datum| async move {
//!         Ok(vec![Message::new(datum.value.to_ascii_lowercase())])
//!     })
//!     .start()
//!     .await
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::bridge::unary::UnaryCall;
use crate::config::ServerConfig;
use crate::error::{Error, HandlerResult, Result};
use crate::message::{Datum, Message};
use crate::server::Server;
use crate::server_info::{ServerInfo, MAP_MODE_KEY, MINIMUM_NUMAFLOW_VERSION};
use crate::shape::{Method, Shape};
use crate::wire::MessageBody;

pub const SOCKET_PATH: &str = "/var/run/numaflow/map.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/mapper-server-info";

pub const MAP: Method = Method::streaming("map", 2);

/// A map function.
///
/// Implemented for any `Fn(Vec<String>, Datum) -> impl Future<Output = HandlerResult<Vec<Message>>>`.
pub trait Mapper: Send + Sync + 'static {
    fn map(&self, keys: Vec<String>, datum: Datum) -> BoxFuture<'_, HandlerResult<Vec<Message>>>;
}

impl<F, Fut> Mapper for F
where
    F: Fn(Vec<String>, Datum) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Vec<Message>>> + Send + 'static,
{
    fn map(&self, keys: Vec<String>, datum: Datum) -> BoxFuture<'_, HandlerResult<Vec<Message>>> {
        Box::pin(self(keys, datum))
    }
}

struct MapCall<M>(M);

impl<M: Mapper> UnaryCall for MapCall<M> {
    fn call(&self, datum: Datum) -> BoxFuture<'_, Result<Vec<MessageBody>>> {
        Box::pin(async move {
            let keys = datum.keys.clone();
            let messages = self.0.map(keys, datum).await.map_err(Error::user)?;
            Ok(messages.into_iter().map(MessageBody::from).collect())
        })
    }
}

/// Server for `mapper` on the default map socket.
pub fn server<M: Mapper>(mapper: M) -> Server {
    let shape = Shape::Unary {
        method: MAP,
        call: Arc::new(MapCall(mapper)),
    };
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION).with_metadata(MAP_MODE_KEY, "unary-map"),
    )
}
