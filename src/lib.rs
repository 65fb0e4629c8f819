//! # streamfn
//!
//! Run user-defined stream functions (map, sink, reduce, source, ...) as
//! servers that a streaming engine drives over Unix domain sockets.
//!
//! ## Architecture
//!
//! - **Framing**: every message is an 11-byte header plus a MessagePack body
//! - **Channels**: one socket connection per method; streaming methods open
//!   with a handshake and mark the end of each unit of work with EOT
//! - **Shapes**: a service is unary (map), batch (sink), streaming (reduce)
//!   or multi-method (source); the shape fixes how frames reach user code
//! - **Server info**: a side-channel file tells the engine the protocol and
//!   method table before the socket accepts connections
//!
//! ## Example
//!
//! ```ignore
//! use streamfn::{map, Datum, Message};
//!
//! #[tokio::main]
//! async fn main() -> streamfn::Result<()> {
//!     map::server(|_keys: Vec<String>, datum: Datum| async move {
//!         Ok(vec![Message::new(datum.value)])
//!     })
//!     .start()
//!     .await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server_info;
pub mod wire;

pub mod accumulator;
pub mod batchmap;
pub mod map;
pub mod mapstream;
pub mod reduce;
pub mod reducestream;
pub mod sessionreduce;
pub mod sideinput;
pub mod sink;
pub mod source;
pub mod sourcetransform;

mod bridge;
mod message;
mod responder;
mod server;
mod session;
mod shape;
mod transport;
mod writer;

#[cfg(test)]
mod testing;

pub use bridge::stream::{DatumStream, Emitter};
pub use config::ServerConfig;
pub use error::{BoxError, Error, HandlerResult, Result};
pub use message::{Datum, Message, DROP};
pub use server::Server;
pub use session::Cardinality;
pub use shape::{Method, READY};
