//! Sinker - logs every record and fails the empty ones.

use streamfn::sink::{self, Response};
use streamfn::Datum;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> streamfn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    sink::server(|batch: Vec<Datum>| async move {
        info!(size = batch.len(), "received batch");
        let responses = batch
            .into_iter()
            .map(|datum| {
                if datum.value.is_empty() {
                    Response::failure(datum.id, "empty record")
                } else {
                    info!(id = %datum.id, value = %String::from_utf8_lossy(&datum.value), "sink");
                    Response::ok(datum.id)
                }
            })
            .collect();
        Ok(responses)
    })
    .start()
    .await
}
