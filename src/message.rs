//! Records handed to user functions and the messages they return.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_bytes::ByteBuf;

use crate::codec::time::{from_datetime, to_datetime};
use crate::wire::{DatumBody, MessageBody};

/// Tag that tells the engine to discard a message.
pub const DROP: &str = "U+005C__DROP__";

/// One record from the engine. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    /// Correlation id; empty on shapes that do not correlate per record.
    pub id: String,
    pub keys: Vec<String>,
    pub value: Vec<u8>,
    pub event_time: DateTime<Utc>,
    pub watermark: DateTime<Utc>,
    pub headers: HashMap<String, String>,
}

impl From<DatumBody> for Datum {
    fn from(body: DatumBody) -> Self {
        Self {
            id: body.id,
            keys: body.keys,
            value: body.value.into_vec(),
            event_time: to_datetime(body.event_time),
            watermark: to_datetime(body.watermark),
            headers: body.headers,
        }
    }
}

impl From<Datum> for DatumBody {
    fn from(datum: Datum) -> Self {
        Self {
            id: datum.id,
            keys: datum.keys,
            value: ByteBuf::from(datum.value),
            event_time: Some(from_datetime(datum.event_time)),
            watermark: Some(from_datetime(datum.watermark)),
            headers: datum.headers,
        }
    }
}

/// A message returned by a user function.
///
/// ```
/// use streamfn::Message;
///
/// let msg = Message::new(b"hello".to_vec())
///     .with_keys(vec!["k".to_string()])
///     .with_tags(vec!["even".to_string()]);
/// assert_eq!(msg.tags.as_deref(), Some(&["even".to_string()][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub keys: Option<Vec<String>>,
    pub value: Vec<u8>,
    pub tags: Option<Vec<String>>,
}

impl Message {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    /// A message the engine discards.
    pub fn drop() -> Self {
        Self {
            tags: Some(vec![DROP.to_string()]),
            ..Default::default()
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
}

impl From<Message> for MessageBody {
    fn from(msg: Message) -> Self {
        Self {
            value: ByteBuf::from(msg.value),
            keys: msg.keys,
            tags: msg.tags,
            ..Default::default()
        }
    }
}
