//! # Built-in handlers
//!
//! Small, self-contained [`Handle`](crate::Handle) implementations useful for
//! demos and diagnostics.
//!
//! - [`LogWriter`]: logs every received event through `tracing` (feature `logging`).

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
