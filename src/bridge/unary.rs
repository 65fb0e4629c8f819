//! Unary correlator (map, source transform).
//!
//! Records are handled one at a time: decode, call the user function, write
//! one response tagged with the record's id. The next frame is not read
//! until that response is queued.

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::message::Datum;
use crate::session::{Channel, Inbound};
use crate::wire::{DatumBody, MapResponse, MessageBody};

/// A per-record call whose results are correlated by record id.
pub(crate) trait UnaryCall: Send + Sync + 'static {
    fn call(&self, datum: Datum) -> BoxFuture<'_, Result<Vec<MessageBody>>>;
}

/// Drive `call` until the engine closes the channel.
pub(crate) async fn correlate(call: &dyn UnaryCall, channel: &mut Channel) -> Result<()> {
    while let Some(inbound) = channel.next().await? {
        match inbound {
            Inbound::Data {
                request_id,
                payload,
            } => {
                let body: DatumBody = MsgPackCodec::decode(&payload)?;
                let id = body.id.clone();
                let results = call.call(Datum::from(body)).await?;
                if results.is_empty() {
                    warn!(id = %id, "user function returned no messages");
                }
                channel
                    .responder()
                    .respond(request_id, &MapResponse { id, results })
                    .await?;
            }
            Inbound::Eot { request_id } => {
                debug!(request_id, "end of transmission");
                channel.responder().eot(request_id).await?;
            }
        }
    }
    Ok(())
}
