//! Mapper - tags every record as even or odd by its numeric value.
//!
//! Records that do not parse as an integer are dropped.
//!
//! ```text
//! RUST_LOG=debug cargo run --example mapper
//! ```

use streamfn::{map, Datum, Message};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> streamfn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    map::server(|keys: Vec<String>, datum: Datum| async move {
        let parsed = std::str::from_utf8(&datum.value)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok());

        let msg = match parsed {
            Some(n) => {
                let tag = if n % 2 == 0 { "even" } else { "odd" };
                Message::new(datum.value)
                    .with_keys(keys)
                    .with_tags(vec![tag.to_string()])
            }
            None => Message::drop(),
        };
        Ok(vec![msg])
    })
    .start()
    .await
}
