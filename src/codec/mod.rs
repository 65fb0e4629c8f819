//! Codec module - payload encoding and timestamp conversion.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`, structs as maps)
//! - [`time`] - conversion between wire timestamps and `chrono` date-times

mod msgpack;
pub mod time;

pub use msgpack::MsgPackCodec;
