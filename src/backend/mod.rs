//! Event backend: the public façade over queue, dispatcher and worker pool.
//!
//! ## Contents
//! - [`EventBackend`] start/stop lifecycle, publish, subscribe/unsubscribe, stats
//! - [`BackendState`] `Created → Started → Stopped`
//! - [`BackendStats`] read-only snapshot for monitoring collaborators

mod event_backend;
mod stats;

pub use event_backend::{BackendState, EventBackend};
pub use stats::BackendStats;
