//! Subscription registry and handler dispatch.
//!
//! ## Contents
//! - [`Handle`] async handler trait, [`HandlerFn`] closure adapter, [`HandlerRef`] shared handle
//! - [`Subscription`], [`SubscriptionId`], [`PropagationMode`], [`EventFilter`]
//! - [`Dispatcher`] resolves subscribers for an event and invokes them with isolation
//!
//! ## Propagation at a glance
//! ```text
//! topic "t":  broadcast   [b1, b2]      → b1 + b2
//!             competing   [c1, c2, c3]  → the one with fewest deliveries
//!             round_robin [r1, r2]      → r1, r2, r1, ...
//! ```
//! Groups on the same topic apply their rule independently.

mod dispatcher;
mod handler;
mod registry;
mod subscription;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use handler::{Handle, HandlerFn, HandlerRef};
pub use subscription::{EventFilter, PropagationMode, Subscription, SubscriptionId};
