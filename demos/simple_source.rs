//! Simple source - produces an increasing counter and tracks unacked offsets.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use futures::future::BoxFuture;
use streamfn::source::{self, Message, Offset, ReadRequest, Sourcer};
use streamfn::{Emitter, HandlerResult};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Counter {
    next: AtomicU64,
    in_flight: Mutex<BTreeSet<u64>>,
}

impl Counter {
    async fn produce(&self, request: ReadRequest, output: Emitter<Message>) -> HandlerResult<()> {
        for _ in 0..request.count {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            self.in_flight.lock().map_err(|e| e.to_string())?.insert(n);
            let msg = Message {
                value: n.to_string().into_bytes(),
                offset: Offset::with_default_partition(n.to_be_bytes().to_vec(), 0),
                event_time: Utc::now(),
                keys: vec![],
                headers: Default::default(),
            };
            output.emit(msg).await?;
        }
        Ok(())
    }

    fn settle(&self, offsets: Vec<Offset>) -> HandlerResult<()> {
        let mut in_flight = self.in_flight.lock().map_err(|e| e.to_string())?;
        for offset in offsets {
            let bytes: [u8; 8] = offset.offset.as_slice().try_into()?;
            in_flight.remove(&u64::from_be_bytes(bytes));
        }
        Ok(())
    }

    fn outstanding(&self) -> HandlerResult<Option<u64>> {
        let in_flight = self.in_flight.lock().map_err(|e| e.to_string())?;
        Ok(Some(in_flight.len() as u64))
    }
}

impl Sourcer for Counter {
    fn read(&self, request: ReadRequest, output: Emitter<Message>) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(self.produce(request, output))
    }

    fn ack(&self, offsets: Vec<Offset>) -> BoxFuture<'_, HandlerResult<()>> {
        let settled = self.settle(offsets);
        Box::pin(async move { settled })
    }

    fn pending(&self) -> BoxFuture<'_, HandlerResult<Option<u64>>> {
        let pending = self.outstanding();
        Box::pin(async move { pending })
    }

    fn partitions(&self) -> BoxFuture<'_, HandlerResult<Option<Vec<i32>>>> {
        Box::pin(async { Ok(None) })
    }
}

#[tokio::main]
async fn main() -> streamfn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    source::server(Counter::default()).start().await
}
