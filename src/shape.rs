//! Interaction shapes and method tables.
//!
//! Every service is one [`Shape`], chosen when its server is built. The
//! shape fixes the method table the server advertises and which bridge
//! drives a channel once its method is known.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::debug;

use crate::bridge::batch::{accumulate, BatchCall};
use crate::bridge::unary::{correlate, UnaryCall};
use crate::codec::MsgPackCodec;
use crate::error::{Error, Result};
use crate::session::{Cardinality, Channel, Inbound};
use crate::wire::ReadyResponse;

/// An operation a service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub name: &'static str,
    pub id: u16,
    pub cardinality: Cardinality,
}

impl Method {
    pub(crate) const fn streaming(name: &'static str, id: u16) -> Self {
        Self {
            name,
            id,
            cardinality: Cardinality::Streaming,
        }
    }

    pub(crate) const fn unary(name: &'static str, id: u16) -> Self {
        Self {
            name,
            id,
            cardinality: Cardinality::Unary,
        }
    }
}

/// Readiness probe every service answers.
pub const READY: Method = Method::unary("ready", 1);

/// Streaming shapes drive the whole channel themselves.
pub(crate) trait ProducerDriver: Send + Sync + 'static {
    fn drive<'a>(&'a self, channel: &'a mut Channel) -> BoxFuture<'a, Result<()>>;
}

/// A service with several independently dispatched operations.
pub(crate) trait MultiMethodService: Send + Sync + 'static {
    fn methods(&self) -> &'static [Method];

    fn stream<'a>(&'a self, method: Method, channel: &'a mut Channel)
        -> BoxFuture<'a, Result<()>>;

    fn unary(&self, method: Method, payload: Bytes) -> BoxFuture<'_, Result<Vec<u8>>>;
}

/// The call pattern of a service.
pub(crate) enum Shape {
    /// One response per record.
    Unary {
        method: Method,
        call: Arc<dyn UnaryCall>,
    },
    /// One response list per batch.
    Batch {
        method: Method,
        call: Arc<dyn BatchCall>,
    },
    /// Results produced incrementally.
    StreamingProducer {
        method: Method,
        driver: Arc<dyn ProducerDriver>,
    },
    /// Several operations with their own cardinalities.
    MultiMethod(Arc<dyn MultiMethodService>),
}

impl Shape {
    /// Methods advertised for this shape, `ready` first.
    pub(crate) fn methods(&self) -> Vec<Method> {
        let mut methods = vec![READY];
        match self {
            Shape::Unary { method, .. }
            | Shape::Batch { method, .. }
            | Shape::StreamingProducer { method, .. } => methods.push(*method),
            Shape::MultiMethod(service) => methods.extend_from_slice(service.methods()),
        }
        methods
    }

    fn lookup(&self, method_id: u16) -> Option<Method> {
        self.methods().into_iter().find(|m| m.id == method_id)
    }

    /// Serve one channel until the engine closes it.
    pub(crate) async fn serve(&self, channel: &mut Channel) -> Result<()> {
        let first = match channel.read_frame().await? {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let method = match self.lookup(first.method_id()) {
            Some(method) => method,
            None => {
                channel.bind(first.method_id(), Cardinality::Unary);
                return Err(Error::UnknownMethod(first.method_id()));
            }
        };
        debug!(method = method.name, "channel opened");

        channel.bind(method.id, method.cardinality);
        match method.cardinality {
            Cardinality::Streaming => channel.complete_handshake(first).await?,
            Cardinality::Unary => channel.unread(first),
        }

        if method == READY {
            return answer_each(channel, |_| {
                Box::pin(async { MsgPackCodec::encode(&ReadyResponse { ready: true }) })
            })
            .await;
        }

        match self {
            Shape::Unary { call, .. } => correlate(call.as_ref(), channel).await,
            Shape::Batch { call, .. } => accumulate(call.as_ref(), channel).await,
            Shape::StreamingProducer { driver, .. } => driver.drive(channel).await,
            Shape::MultiMethod(service) => match method.cardinality {
                Cardinality::Streaming => service.stream(method, channel).await,
                Cardinality::Unary => {
                    answer_each(channel, |payload| service.unary(method, payload)).await
                }
            },
        }
    }
}

/// Unary channel loop: one encoded response per request frame.
async fn answer_each<'s, F>(channel: &mut Channel, mut answer: F) -> Result<()>
where
    F: FnMut(Bytes) -> BoxFuture<'s, Result<Vec<u8>>>,
{
    while let Some(inbound) = channel.next().await? {
        if let Inbound::Data {
            request_id,
            payload,
        } = inbound
        {
            let response = answer(payload).await?;
            channel
                .responder()
                .respond_bytes(request_id, Bytes::from(response))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl UnaryCall for Echo {
        fn call(
            &self,
            datum: crate::Datum,
        ) -> BoxFuture<'_, Result<Vec<crate::wire::MessageBody>>> {
            Box::pin(async move { Ok(vec![crate::Message::new(datum.value).into()]) })
        }
    }

    #[test]
    fn test_ready_is_always_advertised_first() {
        let shape = Shape::Unary {
            method: Method::streaming("map", 2),
            call: Arc::new(Echo),
        };
        let names: Vec<_> = shape.methods().iter().map(|m| m.name).collect();
        assert_eq!(names, ["ready", "map"]);
        assert_eq!(shape.lookup(2).map(|m| m.cardinality), Some(Cardinality::Streaming));
        assert!(shape.lookup(9).is_none());
    }
}
