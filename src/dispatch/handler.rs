//! # Handler abstraction and function-backed handler.
//!
//! [`Handle`] is the extension point for code that reacts to events. A
//! handler is invoked by a dispatch worker with a shared [`Event`]; its
//! result is recorded but never reaches the publisher.
//!
//! [`HandlerFn`] wraps a closure `F: Fn(Arc<Event>) -> Fut`, producing a fresh
//! future per invocation. If state must be shared between invocations, capture
//! an `Arc<...>` explicitly.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use agentbus::{Event, Handle, HandlerError, HandlerFn, HandlerRef};
//!
//! let h: HandlerRef = HandlerFn::arc("audit", |ev: Arc<Event>| async move {
//!     if ev.data.is_empty() {
//!         return Err(HandlerError::failed("empty payload"));
//!     }
//!     Ok(())
//! });
//!
//! assert_eq!(h.name(), "audit");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::Event;

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handle>;

/// Contract for event handlers.
///
/// Called from dispatch workers; several invocations of the same handler may
/// run concurrently when the backend has more than one worker. Implementations
/// should avoid blocking the async runtime.
#[async_trait]
pub trait Handle: Send + Sync + 'static {
    /// Handles a single event.
    ///
    /// Errors and panics are caught by the dispatcher, counted and logged.
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed handler.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Handle for HandlerFn<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
