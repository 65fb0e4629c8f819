//! Shape-specific components that drive user functions from a [`Channel`].
//!
//! - [`unary`] - one response per record, in arrival order
//! - [`batch`] - buffer until EOT, one call per batch
//! - [`stream`] - pull-style input, push-style output
//!
//! [`Channel`]: crate::session::Channel

pub(crate) mod batch;
pub(crate) mod stream;
pub(crate) mod unary;
