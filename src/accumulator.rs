//! Accumulator: a long-running, keyed, ordered stream processor.
//!
//! Unlike reduce there is no window. The accumulator keeps whatever state it
//! needs while the group is open and emits messages that keep the identity
//! and timing of the records they came from.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_bytes::ByteBuf;

use crate::bridge::stream::{
    encode_group_result, DatumStream, Emitter, GroupCall, GroupDriver, GroupKey,
};
use crate::codec::time::from_datetime;
use crate::config::ServerConfig;
use crate::error::{HandlerResult, Result};
use crate::message::Datum;
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION_ACCUMULATOR};
use crate::shape::{Method, Shape};
use crate::wire::MessageBody;

pub const SOCKET_PATH: &str = "/var/run/numaflow/accumulator.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/accumulator-server-info";

pub const ACCUMULATE: Method = Method::streaming("accumulate", 2);

/// Output of an accumulator; carries the metadata of its source record.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorMessage {
    pub keys: Vec<String>,
    pub value: Vec<u8>,
    pub tags: Option<Vec<String>>,
    pub id: String,
    pub headers: HashMap<String, String>,
    pub event_time: DateTime<Utc>,
    pub watermark: DateTime<Utc>,
}

impl AccumulatorMessage {
    /// `value` with the id, keys, headers and times of `datum`.
    pub fn from_datum(value: Vec<u8>, datum: Datum) -> Self {
        Self {
            keys: datum.keys,
            value,
            tags: None,
            id: datum.id,
            headers: datum.headers,
            event_time: datum.event_time,
            watermark: datum.watermark,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

impl From<AccumulatorMessage> for MessageBody {
    fn from(msg: AccumulatorMessage) -> Self {
        Self {
            value: ByteBuf::from(msg.value),
            keys: Some(msg.keys),
            tags: msg.tags,
            event_time: Some(from_datetime(msg.event_time)),
            id: Some(msg.id),
            headers: Some(msg.headers),
            watermark: Some(from_datetime(msg.watermark)),
        }
    }
}

/// An accumulator function.
pub trait Accumulator: Send + Sync + 'static {
    fn accumulate(
        &self,
        input: DatumStream,
        output: Emitter<AccumulatorMessage>,
    ) -> BoxFuture<'_, HandlerResult<()>>;
}

impl<F, Fut> Accumulator for F
where
    F: Fn(DatumStream, Emitter<AccumulatorMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    fn accumulate(
        &self,
        input: DatumStream,
        output: Emitter<AccumulatorMessage>,
    ) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(self(input, output))
    }
}

struct AccumulateCall<A>(A);

impl<A: Accumulator> GroupCall for AccumulateCall<A> {
    type Output = AccumulatorMessage;

    fn invoke(
        self: Arc<Self>,
        _key: GroupKey,
        input: DatumStream,
        output: Emitter<AccumulatorMessage>,
    ) -> BoxFuture<'static, HandlerResult<()>> {
        Box::pin(async move { self.0.accumulate(input, output).await })
    }

    fn encode(key: &GroupKey, output: AccumulatorMessage) -> Result<Vec<u8>> {
        encode_group_result(key, MessageBody::from(output))
    }
}

pub fn server<A: Accumulator>(accumulator: A) -> Server {
    let shape = Shape::StreamingProducer {
        method: ACCUMULATE,
        driver: Arc::new(GroupDriver(Arc::new(AccumulateCall(accumulator)))),
    };
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION_ACCUMULATOR),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::time::to_datetime;
    use crate::error::BoxError;
    use crate::testing::Engine;
    use crate::wire::{DatumBody, GroupRequest, GroupResponse, Timestamp};

    fn request(id: &str, seconds: i64) -> GroupRequest {
        let mut headers = HashMap::new();
        headers.insert("trace".to_string(), id.to_string());
        GroupRequest {
            window: None,
            datum: DatumBody {
                id: id.to_string(),
                keys: vec!["acct".to_string()],
                value: ByteBuf::from(b"v".to_vec()),
                event_time: Some(Timestamp { seconds, nanos: 0 }),
                watermark: Some(Timestamp {
                    seconds: seconds - 1,
                    nanos: 0,
                }),
                headers,
            },
        }
    }

    /// Re-emits records sorted by event time once the group closes.
    fn sorter() -> Server {
        server(
            |mut input: DatumStream, output: Emitter<AccumulatorMessage>| async move {
                let mut held = Vec::new();
                while let Some(datum) = input.next().await {
                    held.push(datum);
                }
                held.sort_by_key(|d| d.event_time);
                for datum in held {
                    let value = datum.id.clone().into_bytes();
                    output.emit(AccumulatorMessage::from_datum(value, datum)).await?;
                }
                Ok::<(), BoxError>(())
            },
        )
    }

    #[tokio::test]
    async fn test_output_keeps_record_metadata() {
        let mut engine = Engine::open(sorter().shape(), ACCUMULATE.id).await;

        engine.send(&request("late", 20)).await;
        engine.send(&request("early", 10)).await;
        engine.eot().await;

        let replies = engine.recv_until_eot().await;
        assert_eq!(replies.len(), 3);

        let first: GroupResponse = replies[0].body();
        assert_eq!(first.keys, ["acct"]);
        let result = first.result;
        assert_eq!(result.id.as_deref(), Some("early"));
        assert_eq!(result.value.as_slice(), b"early");
        assert_eq!(result.keys, Some(vec!["acct".to_string()]));
        assert_eq!(
            result.headers.unwrap().get("trace").map(String::as_str),
            Some("early")
        );
        assert_eq!(to_datetime(result.event_time).timestamp(), 10);
        assert_eq!(to_datetime(result.watermark).timestamp(), 9);

        let second: GroupResponse = replies[1].body();
        assert_eq!(second.result.id.as_deref(), Some("late"));
        assert!(replies[2].is_eot());
    }

    #[test]
    fn test_server_info_requires_newer_engine() {
        let server = sorter();
        assert_eq!(server.server_info().minimum_numaflow_version, "1.5.0-z");
    }
}
