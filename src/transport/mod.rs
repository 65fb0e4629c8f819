//! Transport module - Unix domain socket listener.

mod uds;

pub use uds::SocketListener;
