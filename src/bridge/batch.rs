//! Batch accumulator (sink, batch map).
//!
//! Records are buffered until the engine sends EOT. The user function is then
//! called once with the whole batch; its results are matched back to the
//! records by id, written as a single frame in record order, and followed by
//! an EOT frame. The buffer is then empty and the next batch can start.
//!
//! Buffering is unbounded: a batch is held in memory until its EOT arrives.

use std::collections::{HashMap, VecDeque};

use futures::future::BoxFuture;
use tracing::debug;

use crate::codec::MsgPackCodec;
use crate::error::{Error, Result};
use crate::message::Datum;
use crate::responder::Responder;
use crate::session::{Channel, Inbound};
use crate::wire::{BatchResponseBody, BatchResult, DatumBody};

/// A call that receives a whole batch and answers every record in it.
pub(crate) trait BatchCall: Send + Sync + 'static {
    fn call(&self, batch: Vec<Datum>) -> BoxFuture<'_, Result<Vec<BatchResult>>>;
}

/// Drive `call` until the engine closes the channel.
///
/// Records still buffered when the channel closes are flushed as a final batch.
pub(crate) async fn accumulate(call: &dyn BatchCall, channel: &mut Channel) -> Result<()> {
    let mut batch: Vec<Datum> = Vec::new();
    loop {
        match channel.next().await? {
            Some(Inbound::Data { payload, .. }) => {
                let body: DatumBody = MsgPackCodec::decode(&payload)?;
                batch.push(Datum::from(body));
            }
            Some(Inbound::Eot { request_id }) => {
                flush(call, channel.responder(), request_id, std::mem::take(&mut batch)).await?;
            }
            None => {
                if !batch.is_empty() {
                    debug!(len = batch.len(), "channel closed mid-batch, flushing");
                    let request_id = channel.last_request_id();
                    flush(call, channel.responder(), request_id, batch).await?;
                }
                return Ok(());
            }
        }
    }
}

async fn flush(
    call: &dyn BatchCall,
    responder: &Responder,
    request_id: u32,
    batch: Vec<Datum>,
) -> Result<()> {
    debug!(len = batch.len(), "flushing batch");
    let ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();
    let results = if batch.is_empty() {
        Vec::new()
    } else {
        call.call(batch).await?
    };
    let results = align(&ids, results)?;

    responder
        .respond(request_id, &BatchResponseBody { results })
        .await?;
    responder.eot(request_id).await
}

/// Order `results` like `ids`, one result per id.
fn align(ids: &[String], results: Vec<BatchResult>) -> Result<Vec<BatchResult>> {
    if results.len() != ids.len() {
        return Err(Error::BatchMismatch(format!(
            "{} result(s) for a batch of {}",
            results.len(),
            ids.len()
        )));
    }

    let mut by_id: HashMap<String, VecDeque<BatchResult>> = HashMap::new();
    for result in results {
        by_id
            .entry(result.id().to_string())
            .or_default()
            .push_back(result);
    }

    ids.iter()
        .map(|id| {
            by_id
                .get_mut(id)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| Error::BatchMismatch(format!("no result for record {id:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{SinkResult, SinkStatus};

    fn ok(id: &str) -> BatchResult {
        BatchResult::Sink(SinkResult {
            id: id.to_string(),
            status: SinkStatus::Success,
            err_msg: None,
            serve_response: None,
            on_success_msg: None,
        })
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_align_restores_record_order() {
        let aligned = align(&ids(&["1", "2", "3"]), vec![ok("3"), ok("1"), ok("2")]).unwrap();
        let order: Vec<_> = aligned.iter().map(BatchResult::id).collect();
        assert_eq!(order, ["1", "2", "3"]);
    }

    #[test]
    fn test_align_rejects_short_and_long_lists() {
        assert!(matches!(
            align(&ids(&["1", "2"]), vec![ok("1")]),
            Err(Error::BatchMismatch(_))
        ));
        assert!(matches!(
            align(&ids(&["1"]), vec![ok("1"), ok("1")]),
            Err(Error::BatchMismatch(_))
        ));
    }

    #[test]
    fn test_align_rejects_unknown_id() {
        assert!(matches!(
            align(&ids(&["1", "2"]), vec![ok("1"), ok("9")]),
            Err(Error::BatchMismatch(_))
        ));
    }

    #[test]
    fn test_align_handles_repeated_ids() {
        let aligned = align(&ids(&["a", "a"]), vec![ok("a"), ok("a")]).unwrap();
        assert_eq!(aligned.len(), 2);
    }
}
