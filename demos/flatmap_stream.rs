//! Flatmap stream - splits each record on commas and streams the parts back.

use streamfn::{mapstream, Datum, Emitter, HandlerResult, Message};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> streamfn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    mapstream::server(
        |keys: Vec<String>, datum: Datum, output: Emitter<Message>| async move {
            for part in datum.value.split(|b| *b == b',') {
                output
                    .emit(Message::new(part.to_vec()).with_keys(keys.clone()))
                    .await?;
            }
            HandlerResult::Ok(())
        },
    )
    .start()
    .await
}
