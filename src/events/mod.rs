//! Bus events: the data model carried from producers to handlers.
//!
//! ## Contents
//! - [`Event`] immutable message routed by its `kind` (the topic)
//! - [`Level`] severity that doubles as queue priority
//!
//! ## Quick reference
//! - **Producers**: anything holding an [`EventBackend`](crate::EventBackend)
//!   (REST handlers, tool executors, the [`LoadAwareScheduler`](crate::LoadAwareScheduler) hand-off).
//! - **Consumers**: handlers registered through `subscribe`, invoked by dispatch workers.

mod event;
mod level;

pub use event::Event;
pub use level::Level;
