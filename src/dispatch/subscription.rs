//! # Subscriptions and propagation modes.
//!
//! A [`Subscription`] binds a handler to one topic (exact match on
//! [`Event::kind`]) with a [`PropagationMode`] and an optional filter.
//! The mode belongs to the subscription, not the topic: one topic may mix
//! broadcast, competing and round-robin subscribers, and each group applies
//! its own rule independently.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::handler::HandlerRef;
use crate::events::Event;

/// Filter predicate evaluated before a subscription is considered for an event.
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// How an event is delivered among the subscribers of one mode on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropagationMode {
    /// Every matching subscriber receives the event.
    Broadcast,
    /// Exactly one matching subscriber receives the event: the one with the
    /// fewest deliveries so far, ties broken round-robin.
    Competing,
    /// Exactly one matching subscriber receives the event, cycling through
    /// subscribers in registration order.
    RoundRobin,
}

impl PropagationMode {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PropagationMode::Broadcast => "broadcast",
            PropagationMode::Competing => "competing",
            PropagationMode::RoundRobin => "round_robin",
        }
    }
}

/// Unique identifier of a subscription within one dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A registered handler.
pub struct Subscription {
    id: SubscriptionId,
    topic: Arc<str>,
    handler: HandlerRef,
    mode: PropagationMode,
    filter: Option<EventFilter>,
    /// Cleared on unsubscribe so that pending selections skip it.
    active: AtomicBool,
    delivered: AtomicU64,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        topic: Arc<str>,
        handler: HandlerRef,
        mode: PropagationMode,
        filter: Option<EventFilter>,
    ) -> Self {
        Self {
            id,
            topic,
            handler,
            mode,
            filter,
            active: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn mode(&self) -> PropagationMode {
        self.mode
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    /// Number of times the handler was invoked for this subscription.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `true` if the subscription is active and its filter accepts `event`.
    ///
    /// A panicking filter counts as a rejection.
    pub fn accepts(&self, event: &Event) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some(filter) = &self.filter else {
            return true;
        };
        match catch_unwind(AssertUnwindSafe(|| filter(event))) {
            Ok(accepted) => accepted,
            Err(_) => {
                warn!(
                    subscription = %self.id,
                    topic = %self.topic,
                    event_id = %event.id,
                    "subscription filter panicked; event skipped"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("handler", &self.handler.name())
            .field("mode", &self.mode)
            .field("filtered", &self.filter.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}
