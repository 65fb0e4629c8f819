//! Iterator bridge for streaming shapes.
//!
//! Inbound records reach user code as a [`DatumStream`], pulled one at a
//! time. Results go back through an [`Emitter`], which writes a frame per
//! item the moment it is emitted. A user function that produces a
//! `Stream` instead can hand it to [`Emitter::forward`].
//!
//! Keyed shapes (reduce, reduce stream, accumulator, session reduce) run the
//! user function for a group in its own task so the channel keeps reading
//! while the function consumes input and emits output. [`GroupSet`] owns
//! those tasks, one per key and window; [`run_groups`] is the channel loop
//! shared by reduce, reduce stream and accumulator.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::codec::MsgPackCodec;
use crate::error::{Error, HandlerResult, Result};
use crate::message::Datum;
use crate::responder::Responder;
use crate::session::{Channel, Inbound};
use crate::shape::ProducerDriver;
use crate::wire::{GroupRequest, GroupResponse, MessageBody, WindowBody};

/// Records of one group (or one request), in arrival order.
///
/// Ends when the engine closes the group. Implements [`Stream`].
pub struct DatumStream<T = Datum> {
    rx: mpsc::Receiver<T>,
}

impl<T> DatumStream<T> {
    pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// Next record, or `None` once the group is closed.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for DatumStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

type Encoder<T> = Arc<dyn Fn(T) -> Result<Vec<u8>> + Send + Sync>;

/// Writes each emitted item to the channel immediately.
pub struct Emitter<T> {
    responder: Responder,
    request_id: u32,
    encode: Encoder<T>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            responder: self.responder.clone(),
            request_id: self.request_id,
            encode: Arc::clone(&self.encode),
        }
    }
}

impl<T> Emitter<T> {
    pub(crate) fn new<F>(responder: Responder, request_id: u32, encode: F) -> Self
    where
        F: Fn(T) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            responder,
            request_id,
            encode: Arc::new(encode),
        }
    }

    /// Write one result frame.
    ///
    /// Fails with [`Error::ChannelClosed`] once the channel is gone.
    pub async fn emit(&self, item: T) -> Result<()> {
        let payload = (self.encode)(item)?;
        trace!(request_id = self.request_id, len = payload.len(), "emit");
        self.responder
            .respond_bytes(self.request_id, Bytes::from(payload))
            .await
    }

    /// Emit every item of `items` as it is produced. Returns how many were written.
    pub async fn forward<S>(&self, items: S) -> Result<usize>
    where
        S: Stream<Item = T>,
    {
        let mut items = std::pin::pin!(items);
        let mut written = 0;
        while let Some(item) = items.next().await {
            self.emit(item).await?;
            written += 1;
        }
        Ok(written)
    }
}

/// Identity of a keyed group: its keys and window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GroupKey {
    pub keys: Vec<String>,
    pub window: Option<WindowBody>,
}

struct OpenGroup {
    key: GroupKey,
    tx: mpsc::Sender<Datum>,
    task: JoinHandle<HandlerResult<()>>,
}

/// Running group tasks of one channel, at most one per [`GroupKey`].
///
/// Groups run concurrently; records are routed to the group of their key.
/// EOT closes every open group at once.
pub(crate) struct GroupSet {
    open: Vec<OpenGroup>,
    window: Option<WindowBody>,
    capacity: usize,
}

impl GroupSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            open: Vec::new(),
            window: None,
            capacity,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub(crate) fn contains(&self, key: &GroupKey) -> bool {
        self.open.iter().any(|g| &g.key == key)
    }

    /// Key of a record. A record without a window inherits the window last
    /// named since the previous EOT.
    pub(crate) fn key_for(&mut self, keys: Vec<String>, window: Option<WindowBody>) -> GroupKey {
        if window.is_some() {
            self.window = window;
        }
        GroupKey {
            keys,
            window: window.or(self.window),
        }
    }

    /// Start the group for `key`; `start` receives the group's input and returns its user future.
    pub(crate) fn open<F>(&mut self, key: GroupKey, start: F)
    where
        F: FnOnce(DatumStream) -> BoxFuture<'static, HandlerResult<()>>,
    {
        debug!(keys = ?key.keys, "opening group");
        let (tx, input) = DatumStream::channel(self.capacity);
        let task = tokio::spawn(start(input));
        self.open.push(OpenGroup { key, tx, task });
    }

    /// Hand a record to the group of `key`.
    pub(crate) async fn push(&self, key: &GroupKey, datum: Datum) -> Result<()> {
        let group = self
            .open
            .iter()
            .find(|g| &g.key == key)
            .ok_or_else(|| Error::Protocol(format!("no open group for keys {:?}", key.keys)))?;
        if group.tx.send(datum).await.is_err() {
            // the user function returned without draining its input
            debug!(keys = ?key.keys, "group input dropped, discarding record");
        }
        Ok(())
    }

    /// Close every group's input, wait for the user functions in the order
    /// the groups were opened, then write EOT.
    ///
    /// With no open group this only writes EOT.
    pub(crate) async fn close_all(&mut self, responder: &Responder, request_id: u32) -> Result<()> {
        self.window = None;
        let groups = std::mem::take(&mut self.open);
        let mut tasks = Vec::with_capacity(groups.len());
        for OpenGroup { key, tx, task } in groups {
            drop(tx);
            tasks.push((key, task));
        }

        let mut failure = None;
        for (key, task) in tasks {
            let outcome = match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Error::user(e)),
                Err(e) => Err(Error::User(format!("user task failed: {e}"))),
            };
            if let Err(e) = outcome {
                debug!(keys = ?key.keys, error = %e, "group failed");
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => responder.eot(request_id).await,
        }
    }
}

impl Drop for GroupSet {
    fn drop(&mut self) {
        for group in self.open.drain(..) {
            group.task.abort();
        }
    }
}

/// A keyed shape: how to start the user function for one group.
pub(crate) trait GroupCall: Send + Sync + 'static {
    type Output: Send + 'static;

    fn invoke(
        self: Arc<Self>,
        key: GroupKey,
        input: DatumStream,
        output: Emitter<Self::Output>,
    ) -> BoxFuture<'static, HandlerResult<()>>;

    fn encode(key: &GroupKey, output: Self::Output) -> Result<Vec<u8>>;
}

/// Channel loop for keyed shapes.
///
/// The first record for a key and window opens that group; later records
/// with the same key and window join it. EOT closes all open groups. Groups
/// still open when the channel closes are finished before returning.
pub(crate) async fn run_groups<G: GroupCall>(call: &Arc<G>, channel: &mut Channel) -> Result<()> {
    let mut groups = GroupSet::new(channel.queue_capacity());
    loop {
        match channel.next().await? {
            Some(Inbound::Data {
                request_id,
                payload,
            }) => {
                let request: GroupRequest = MsgPackCodec::decode(&payload)?;
                let datum = Datum::from(request.datum);
                let key = groups.key_for(datum.keys.clone(), request.window);
                if !groups.contains(&key) {
                    let output = group_emitter::<G>(channel.responder(), request_id, key.clone());
                    let call = Arc::clone(call);
                    let group_key = key.clone();
                    groups.open(key.clone(), move |input| call.invoke(group_key, input, output));
                }
                groups.push(&key, datum).await?;
            }
            Some(Inbound::Eot { request_id }) => {
                groups.close_all(channel.responder(), request_id).await?;
            }
            None => {
                if !groups.is_empty() {
                    groups
                        .close_all(channel.responder(), channel.last_request_id())
                        .await?;
                }
                return Ok(());
            }
        }
    }
}

pub(crate) fn group_emitter<G: GroupCall>(
    responder: &Responder,
    request_id: u32,
    key: GroupKey,
) -> Emitter<G::Output> {
    Emitter::new(responder.clone(), request_id, move |out| G::encode(&key, out))
}

/// Body of one result frame for `key`'s group.
pub(crate) fn encode_group_result(key: &GroupKey, result: MessageBody) -> Result<Vec<u8>> {
    MsgPackCodec::encode(&GroupResponse {
        window: key.window,
        keys: key.keys.clone(),
        result,
    })
}

/// Runs a [`GroupCall`] shape on a channel.
pub(crate) struct GroupDriver<G>(pub Arc<G>);

impl<G: GroupCall> ProducerDriver for GroupDriver<G> {
    fn drive<'a>(&'a self, channel: &'a mut Channel) -> BoxFuture<'a, Result<()>> {
        Box::pin(run_groups(&self.0, channel))
    }
}
