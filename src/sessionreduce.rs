//! Session reduce: reduce over session windows that the engine may
//! checkpoint, merge and close.
//!
//! A session is identified by its keys and window. The first record for a
//! session gets a fresh reducer from the [`SessionReducerCreator`]; that
//! reducer keeps the session's state until the engine closes the session or
//! the channel ends. Records between two EOTs are handed to
//! [`SessionReducer::session_reduce`] as one input stream per session, and
//! EOT finishes every running session reduce.
//!
//! Besides appending records, the engine can snapshot a session's
//! accumulated state, merge a snapshot from another session into it, and
//! close it. Those operations are only accepted while the targeted session
//! is not being reduced; asking for one during its reduce fails the channel.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_bytes::ByteBuf;
use tokio::sync::Mutex;
use tracing::debug;

use crate::bridge::stream::{encode_group_result, DatumStream, Emitter, GroupKey, GroupSet};
use crate::codec::MsgPackCodec;
use crate::config::ServerConfig;
use crate::error::{Error, HandlerResult, Result};
use crate::message::{Datum, Message};
use crate::server::Server;
use crate::server_info::{ServerInfo, MINIMUM_NUMAFLOW_VERSION};
use crate::session::{Channel, Inbound};
use crate::shape::{Method, ProducerDriver, Shape};
use crate::wire::{
    CloseResponse, MergeResponse, MessageBody, SessionOperation, SessionRequest,
    SnapshotResponse,
};

pub const SOCKET_PATH: &str = "/var/run/numaflow/sessionreduce.sock";
pub const SERVER_INFO_PATH: &str = "/var/run/numaflow/sessionreducer-server-info";

pub const SESSION_REDUCE: Method = Method::streaming("session_reduce", 2);

/// Reducer state for one session.
pub trait SessionReducer: Send + 'static {
    /// Consume the session's records, emitting results as they are ready.
    fn session_reduce(
        &mut self,
        keys: Vec<String>,
        input: DatumStream,
        output: Emitter<Message>,
    ) -> BoxFuture<'_, HandlerResult<()>>;

    /// Serialize the accumulated state.
    fn accumulator(&mut self) -> BoxFuture<'_, HandlerResult<Vec<u8>>>;

    /// Fold a state produced by [`SessionReducer::accumulator`] into this one.
    fn merge_accumulator(&mut self, accumulator: Vec<u8>) -> BoxFuture<'_, HandlerResult<()>>;
}

/// Builds a fresh [`SessionReducer`] per session.
pub trait SessionReducerCreator: Send + Sync + 'static {
    type Reducer: SessionReducer;

    fn create(&self) -> Self::Reducer;
}

impl<F, R> SessionReducerCreator for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: SessionReducer,
{
    type Reducer = R;

    fn create(&self) -> R {
        self()
    }
}

type Shared<R> = Arc<Mutex<R>>;

/// Live sessions of one channel and the reduces running over them.
struct Sessions<R> {
    reducers: HashMap<GroupKey, Shared<R>>,
    running: GroupSet,
}

impl<R: SessionReducer> Sessions<R> {
    fn new(capacity: usize) -> Self {
        Self {
            reducers: HashMap::new(),
            running: GroupSet::new(capacity),
        }
    }

    /// Reducer of an idle session, for snapshot, merge or close.
    fn idle(&self, key: &GroupKey, operation: &str) -> Result<Option<&Shared<R>>> {
        if self.running.contains(key) {
            return Err(Error::Protocol(format!(
                "{operation} for keys {:?} while that session is being reduced",
                key.keys
            )));
        }
        Ok(self.reducers.get(key))
    }
}

struct SessionDriver<C>(C);

impl<C: SessionReducerCreator> SessionDriver<C> {
    async fn run(&self, channel: &mut Channel) -> Result<()> {
        let mut sessions: Sessions<C::Reducer> = Sessions::new(channel.queue_capacity());

        loop {
            let (request_id, payload) = match channel.next().await? {
                Some(Inbound::Data {
                    request_id,
                    payload,
                }) => (request_id, payload),
                Some(Inbound::Eot { request_id }) => {
                    sessions
                        .running
                        .close_all(channel.responder(), request_id)
                        .await?;
                    continue;
                }
                None => {
                    if !sessions.running.is_empty() {
                        sessions
                            .running
                            .close_all(channel.responder(), channel.last_request_id())
                            .await?;
                    }
                    return Ok(());
                }
            };

            let request: SessionRequest = MsgPackCodec::decode(&payload)?;
            match request.operation {
                SessionOperation::Append => {
                    let datum = request
                        .datum
                        .map(Datum::from)
                        .ok_or_else(|| Error::Protocol("append without a datum".to_string()))?;
                    let key = sessions.running.key_for(datum.keys.clone(), request.window);
                    if !sessions.running.contains(&key) {
                        let reducer = Arc::clone(
                            sessions
                                .reducers
                                .entry(key.clone())
                                .or_insert_with(|| Arc::new(Mutex::new(self.0.create()))),
                        );
                        let keys = key.keys.clone();
                        let output_key = key.clone();
                        let output =
                            Emitter::new(channel.responder().clone(), request_id, move |m: Message| {
                                encode_group_result(&output_key, MessageBody::from(m))
                            });
                        sessions.running.open(key.clone(), move |input| {
                            Box::pin(async move {
                                let mut reducer = reducer.lock_owned().await;
                                reducer.session_reduce(keys, input, output).await
                            })
                        });
                    }
                    sessions.running.push(&key, datum).await?;
                }
                SessionOperation::Snapshot => {
                    let key = GroupKey {
                        keys: request.keys,
                        window: request.window,
                    };
                    let reducer = sessions.idle(&key, "snapshot")?.ok_or_else(|| {
                        Error::Protocol(format!("snapshot of unknown session {:?}", key.keys))
                    })?;
                    let accumulator = reducer
                        .lock()
                        .await
                        .accumulator()
                        .await
                        .map_err(Error::user)?;
                    channel
                        .responder()
                        .respond(
                            request_id,
                            &SnapshotResponse {
                                accumulator: ByteBuf::from(accumulator),
                            },
                        )
                        .await?;
                }
                SessionOperation::Merge => {
                    let key = GroupKey {
                        keys: request.keys,
                        window: request.window,
                    };
                    let accumulator = request.accumulator.ok_or_else(|| {
                        Error::Protocol("merge without an accumulator".to_string())
                    })?;
                    sessions.idle(&key, "merge")?;
                    let reducer = Arc::clone(
                        sessions
                            .reducers
                            .entry(key)
                            .or_insert_with(|| Arc::new(Mutex::new(self.0.create()))),
                    );
                    reducer
                        .lock()
                        .await
                        .merge_accumulator(accumulator.into_vec())
                        .await
                        .map_err(Error::user)?;
                    channel
                        .responder()
                        .respond(request_id, &MergeResponse { merged: true })
                        .await?;
                }
                SessionOperation::Close => {
                    let key = GroupKey {
                        keys: request.keys,
                        window: request.window,
                    };
                    sessions.idle(&key, "close")?;
                    let closed = sessions.reducers.remove(&key).is_some();
                    debug!(keys = ?key.keys, closed, "session closed");
                    channel
                        .responder()
                        .respond(request_id, &CloseResponse { closed })
                        .await?;
                }
            }
        }
    }
}

impl<C: SessionReducerCreator> ProducerDriver for SessionDriver<C> {
    fn drive<'a>(&'a self, channel: &'a mut Channel) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(channel))
    }
}

pub fn server<C: SessionReducerCreator>(creator: C) -> Server {
    let shape = Shape::StreamingProducer {
        method: SESSION_REDUCE,
        driver: Arc::new(SessionDriver(creator)),
    };
    Server::new(
        shape,
        ServerConfig::new(SOCKET_PATH, SERVER_INFO_PATH),
        ServerInfo::new(MINIMUM_NUMAFLOW_VERSION),
    )
}
