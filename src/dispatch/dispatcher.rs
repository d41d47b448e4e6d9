//! # Event dispatcher.
//!
//! [`Dispatcher`] resolves the subscriptions that receive a dequeued event and
//! invokes their handlers with failure isolation.
//!
//! ## Architecture
//! ```text
//! dispatch(event)
//!     │
//!     ├─ lock registry ─► resolve(event) ─► [targets] (selection state advanced under the lock)
//!     │
//!     └─ join_all(targets) ──► handler1.handle(ev) ──► Ok
//!                         ├──► handler2.handle(ev) ──► Err   → error_count += 1, warn!
//!                         └──► handler3.handle(ev) ──► panic → HandlerError::Panicked, warn!
//! ```
//!
//! ## Rules
//! - Handlers of one event run concurrently; none of them can abort a sibling.
//! - Errors and panics are counted and logged, never returned to the publisher.
//! - The registry lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::handler::HandlerRef;
use super::registry::SubscriberRegistry;
use super::subscription::{EventFilter, PropagationMode, Subscription, SubscriptionId};
use crate::error::HandlerError;
use crate::events::Event;

/// Result of dispatching one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl DispatchOutcome {
    /// Total number of handler invocations.
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Subscriber registry plus handler invocation.
///
/// Shared by all backend workers (wrap in `Arc`); all methods take `&self`.
#[derive(Default)]
pub struct Dispatcher {
    registry: Mutex<SubscriberRegistry>,
    processed: AtomicU64,
    errors: AtomicU64,
    delivered: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler on `topic` and returns its subscription id.
    pub fn subscribe(
        &self,
        topic: impl Into<Arc<str>>,
        handler: HandlerRef,
        mode: PropagationMode,
        filter: Option<EventFilter>,
    ) -> SubscriptionId {
        let topic = topic.into();
        let mut registry = self.registry.lock();
        let id = registry.next_id();
        debug!(
            subscription = %id,
            topic = %topic,
            handler = handler.name(),
            mode = mode.as_label(),
            filtered = filter.is_some(),
            "subscribed"
        );
        registry.insert(Arc::new(Subscription::new(id, topic, handler, mode, filter)));
        id
    }

    /// Removes a subscription; returns `false` if it was unknown.
    ///
    /// An invocation already in progress is not interrupted.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.lock().remove(id);
        match &removed {
            Some(sub) => debug!(subscription = %id, topic = %sub.topic(), "unsubscribed"),
            None => trace!(subscription = %id, "unsubscribe of unknown subscription"),
        }
        removed.is_some()
    }

    /// Removes every subscription; returns how many were removed.
    pub fn clear(&self) -> usize {
        self.registry.lock().clear()
    }

    /// Delivers `event` to its subscribers and waits for every handler.
    pub async fn dispatch(&self, event: Event) -> DispatchOutcome {
        let event = Arc::new(event);
        let targets = self.registry.lock().resolve(&event);
        self.processed.fetch_add(1, Ordering::Relaxed);

        if targets.is_empty() {
            trace!(event_id = %event.id, kind = %event.kind, "no subscriber for event");
            return DispatchOutcome::default();
        }
        trace!(
            event_id = %event.id,
            kind = %event.kind,
            targets = targets.len(),
            "dispatching event"
        );

        let results = join_all(
            targets
                .iter()
                .map(|sub| Self::invoke(Arc::clone(sub), Arc::clone(&event))),
        )
        .await;

        let mut outcome = DispatchOutcome::default();
        for (sub, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(err) => {
                    outcome.failed += 1;
                    warn!(
                        topic = %sub.topic(),
                        subscription = %sub.id(),
                        handler = sub.handler().name(),
                        event_id = %event.id,
                        reason = err.as_label(),
                        error = %err,
                        "handler failed"
                    );
                }
            }
        }

        self.delivered
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.errors.fetch_add(outcome.failed as u64, Ordering::Relaxed);
        outcome
    }

    async fn invoke(sub: Arc<Subscription>, event: Arc<Event>) -> Result<(), HandlerError> {
        sub.record_delivery();
        let fut = sub.handler().handle(event);
        match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(panic_err) => {
                let any = &*panic_err;
                let info = if let Some(msg) = any.downcast_ref::<&'static str>() {
                    (*msg).to_string()
                } else if let Some(msg) = any.downcast_ref::<String>() {
                    msg.clone()
                } else {
                    "unknown panic".to_string()
                };
                Err(HandlerError::Panicked { info })
            }
        }
    }

    /// Number of events dispatched so far, including events without subscribers.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Number of handler invocations that failed or panicked.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Number of handler invocations that succeeded.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Number of topics with at least one subscription.
    pub fn topic_count(&self) -> usize {
        self.registry.lock().topic_count()
    }

    /// Handler invocation counts of the subscriptions on `topic`.
    pub fn delivery_counts(&self, topic: &str) -> HashMap<SubscriptionId, u64> {
        self.registry
            .lock()
            .subscriptions(topic)
            .iter()
            .map(|s| (s.id(), s.delivered()))
            .collect()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscriptions", &self.subscription_count())
            .field("processed", &self.processed_count())
            .field("errors", &self.error_count())
            .finish()
    }
}
