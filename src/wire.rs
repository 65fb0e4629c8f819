//! Wire schema: the MsgPack bodies carried in frame payloads.
//!
//! These structs mirror what the engine puts on the socket. Services convert
//! them to and from their user-facing types; nothing outside the crate needs
//! to build them by hand except tests and engine-side tooling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

/// Body of a handshake frame in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeBody {
    pub sot: bool,
}

/// Reply to the `ready` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// One inbound record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatumBody {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub value: ByteBuf,
    #[serde(default)]
    pub event_time: Option<Timestamp>,
    #[serde(default)]
    pub watermark: Option<Timestamp>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// One outbound result message.
///
/// Optional fields are omitted from the map when unset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub value: ByteBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<Timestamp>,
}

/// Results for one record, correlated by the record's `id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapResponse {
    pub id: String,
    pub results: Vec<MessageBody>,
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBody {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Record on a keyed-group channel.
///
/// A record without a window belongs to the window most recently named on
/// the channel since the last EOT.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupRequest {
    #[serde(default)]
    pub window: Option<WindowBody>,
    pub datum: DatumBody,
}

/// One result produced for a keyed group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowBody>,
    pub keys: Vec<String>,
    pub result: MessageBody,
}

/// Session-reduce operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOperation {
    Append,
    Snapshot,
    Merge,
    Close,
}

/// Frame body on a session-reduce channel.
///
/// `Append` names its session through the datum's keys; the other
/// operations name it through `keys`. Both use `window`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub operation: SessionOperation,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub window: Option<WindowBody>,
    #[serde(default)]
    pub datum: Option<DatumBody>,
    #[serde(default)]
    pub accumulator: Option<ByteBuf>,
}

/// Reply to a session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub accumulator: ByteBuf,
}

/// Reply to a session merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResponse {
    pub merged: bool,
}

/// Reply to a session close; `closed` is false when no such session was live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseResponse {
    pub closed: bool,
}

/// Sink status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SinkStatus {
    Success,
    Failure,
    Fallback,
    Serve,
    OnSuccess,
}

/// Outcome for one sunk record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkResult {
    pub id: String,
    pub status: SinkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serve_response: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success_msg: Option<MessageBody>,
}

/// One result per record of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchResult {
    Sink(SinkResult),
    Map(MapResponse),
}

impl BatchResult {
    /// Correlation id of the record this result answers.
    pub fn id(&self) -> &str {
        match self {
            BatchResult::Sink(r) => &r.id,
            BatchResult::Map(r) => &r.id,
        }
    }
}

/// The single frame written when a batch is flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseBody {
    pub results: Vec<BatchResult>,
}

/// Source read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequestBody {
    #[serde(default = "default_num_records")]
    pub num_records: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_num_records() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Position of a record in the upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffsetBody {
    pub offset: ByteBuf,
    pub partition_id: i32,
}

/// One record produced by a source read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResultBody {
    pub value: ByteBuf,
    pub offset: OffsetBody,
    pub event_time: Timestamp,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Offsets to acknowledge or negatively acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffsetsRequest {
    #[serde(default)]
    pub offsets: Vec<OffsetBody>,
}

/// Reply to `ack` and `nack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

/// Reply to `pending`; `-1` means unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingResponse {
    pub count: i64,
}

/// Reply to `partitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionsResponse {
    pub partitions: Vec<i32>,
}

/// Reply to side-input `retrieve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideInputResponse {
    #[serde(default)]
    pub value: Option<ByteBuf>,
    pub no_broadcast: bool,
}
