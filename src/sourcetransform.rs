//! Source transform: map records as they enter the pipeline, with the
//! option to reassign their event time.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_bytes::ByteBuf;

use crate::bridge::unary::UnaryCall;
use crate::codec::time::from_datetime;
use crate::config::ServerConfig;
use crate::error::{Error, HandlerResult, Result};
use crate::message::{Datum, DROP};
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION};
use crate::shape::{Method, Shape};
use crate::wire::MessageBody;

pub const SOCKET_PATH: &str = "/var/run/numaflow/sourcetransform.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/sourcetransformer-server-info";

pub const TRANSFORM: Method = Method::streaming("transform", 2);

/// A transformed message; unlike [`crate::Message`] it always carries an event time.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub keys: Option<Vec<String>>,
    pub value: Vec<u8>,
    pub tags: Option<Vec<String>>,
    pub event_time: DateTime<Utc>,
}

impl Message {
    pub fn new(value: Vec<u8>, event_time: DateTime<Utc>) -> Self {
        Self {
            keys: None,
            value,
            tags: None,
            event_time,
        }
    }

    /// A message the engine discards.
    pub fn drop(event_time: DateTime<Utc>) -> Self {
        Self {
            keys: None,
            value: Vec::new(),
            tags: Some(vec![DROP.to_string()]),
            event_time,
        }
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_event_time(mut self, event_time: DateTime<Utc>) -> Self {
        self.event_time = event_time;
        self
    }
}

impl From<Message> for MessageBody {
    fn from(msg: Message) -> Self {
        Self {
            value: ByteBuf::from(msg.value),
            keys: msg.keys,
            tags: msg.tags,
            event_time: Some(from_datetime(msg.event_time)),
            ..Default::default()
        }
    }
}

/// A source transform function.
pub trait SourceTransformer: Send + Sync + 'static {
    fn transform(
        &self,
        keys: Vec<String>,
        datum: Datum,
    ) -> BoxFuture<'_, HandlerResult<Vec<Message>>>;
}

impl<F, Fut> SourceTransformer for F
where
    F: Fn(Vec<String>, Datum) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Vec<Message>>> + Send + 'static,
{
    fn transform(
        &self,
        keys: Vec<String>,
        datum: Datum,
    ) -> BoxFuture<'_, HandlerResult<Vec<Message>>> {
        Box::pin(self(keys, datum))
    }
}

struct TransformCall<T>(T);

impl<T: SourceTransformer> UnaryCall for TransformCall<T> {
    fn call(&self, datum: Datum) -> BoxFuture<'_, Result<Vec<MessageBody>>> {
        Box::pin(async move {
            let keys = datum.keys.clone();
            let messages = self.0.transform(keys, datum).await.map_err(Error::user)?;
            Ok(messages.into_iter().map(MessageBody::from).collect())
        })
    }
}

pub fn server<T: SourceTransformer>(transformer: T) -> Server {
    let shape = Shape::Unary {
        method: TRANSFORM,
        call: Arc::new(TransformCall(transformer)),
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
    use crate::codec::time::to_datetime;
    use crate::testing::Engine;
    use crate::wire::{DatumBody, MapResponse, Timestamp};
    use chrono::TimeZone;

    fn record(id: &str, value: &str, seconds: i64) -> DatumBody {
        DatumBody {
            id: id.to_string(),
            value: ByteBuf::from(value.as_bytes().to_vec()),
            event_time: Some(Timestamp { seconds, nanos: 0 }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_event_time_is_reassigned() {
        let cutoff = Utc.timestamp_opt(1_000, 0).unwrap();
        let server = server(move |_keys: Vec<String>, datum: Datum| async move {
            if datum.event_time < cutoff {
                return Ok(vec![Message::drop(datum.event_time)]);
            }
            let shifted = datum.event_time + chrono::Duration::seconds(60);
            Ok(vec![Message::new(datum.value, shifted).with_tags(vec!["late".to_string()])])
        });
        let mut engine = Engine::open(server.shape(), TRANSFORM.id).await;

        engine.send(&record("early", "a", 10)).await;
        let early: MapResponse = engine.recv().await.body();
        assert_eq!(early.id, "early");
        assert_eq!(early.results[0].tags, Some(vec![DROP.to_string()]));

        engine.send(&record("kept", "b", 2_000)).await;
        let kept: MapResponse = engine.recv().await.body();
        let result = &kept.results[0];
        assert_eq!(result.value.as_slice(), b"b");
        assert_eq!(
            to_datetime(result.event_time),
            Utc.timestamp_opt(2_060, 0).unwrap()
        );
    }

    #[test]
    fn test_drop_keeps_event_time() {
        let at = Utc.timestamp_opt(42, 7).unwrap();
        let body = MessageBody::from(Message::drop(at));
        assert_eq!(body.event_time, Some(Timestamp { seconds: 42, nanos: 7 }));
        assert!(body.value.is_empty());
    }
}
