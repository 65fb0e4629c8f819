//! Counter reduce - counts the records of each key within a window.

use streamfn::reduce::{self, Metadata};
use streamfn::{DatumStream, Message};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> streamfn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    reduce::server(
        |keys: Vec<String>, mut input: DatumStream, md: Metadata| async move {
            let mut count = 0u64;
            while input.next().await.is_some() {
                count += 1;
            }
            debug!(
                ?keys,
                count,
                start = %md.interval_window.start,
                end = %md.interval_window.end,
                "window closed"
            );
            Ok(vec![Message::new(count.to_string().into_bytes()).with_keys(keys)])
        },
    )
    .start()
    .await
}
