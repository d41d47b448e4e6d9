//! # Bounded, priority-ordered event queue.
//!
//! [`BoundedPriorityQueue`] sits between publishers and dispatch workers.
//!
//! ## Architecture
//! ```text
//! publish(event) ──► enqueue() ──► [ BTreeMap<(priority desc, seq asc), Event> ] ──► dequeue() ──► worker
//!                       │                     (max_size)                              │
//!                       └─ full? apply DropPolicy                    suspends until an item exists
//!                                                                    or the queue is closed
//! ```
//!
//! ## Rules
//! - **Ordering**: higher priority first; FIFO within one priority (arrival sequence).
//! - **Bounded**: never more than `max_size` events; overflow handled by [`DropPolicy`].
//! - **Non-blocking enqueue**: `enqueue()` never waits, it returns `false` on refusal.
//! - **Closure**: `close()` abandons queued events and wakes every suspended `dequeue()`
//!   with `None`, so workers can exit.
//! - **Drain**: `drained()` resolves once the queue has been emptied by consumers.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::{DropPolicy, QueueStats};
use crate::events::Event;

/// Ordering key: priority descending, then arrival ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    priority: Reverse<u8>,
    seq: u64,
}

struct Inner {
    items: BTreeMap<Slot, Event>,
    /// Arrival index: seq → priority. Used to find the longest-resident event.
    arrivals: BTreeMap<u64, u8>,
    next_seq: u64,
    closed: bool,
    dropped: u64,
    enqueued: u64,
    dequeued: u64,
    discarded: u64,
}

impl Inner {
    fn insert(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let priority = event.priority();
        self.arrivals.insert(seq, priority);
        self.items.insert(
            Slot {
                priority: Reverse(priority),
                seq,
            },
            event,
        );
        self.enqueued += 1;
    }

    fn remove(&mut self, slot: Slot) -> Option<Event> {
        self.arrivals.remove(&slot.seq);
        self.items.remove(&slot)
    }

    fn pop(&mut self) -> Option<Event> {
        let (slot, event) = self.items.pop_first()?;
        self.arrivals.remove(&slot.seq);
        self.dequeued += 1;
        Some(event)
    }

    fn oldest(&self) -> Option<Slot> {
        self.arrivals
            .first_key_value()
            .map(|(&seq, &priority)| Slot {
                priority: Reverse(priority),
                seq,
            })
    }

    /// Oldest event among those with the lowest queued priority.
    fn oldest_lowest(&self) -> Option<Slot> {
        let (last, _) = self.items.last_key_value()?;
        let from = Slot {
            priority: last.priority,
            seq: 0,
        };
        self.items.range(from..).next().map(|(slot, _)| *slot)
    }
}

/// Fixed-capacity queue ordered by event priority.
///
/// Shared between publishers and workers (wrap in `Arc`); all operations take `&self`.
pub struct BoundedPriorityQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    /// Signalled whenever the queue becomes empty.
    emptied: Notify,
    max_size: usize,
    policy: DropPolicy,
}

impl BoundedPriorityQueue {
    /// Creates an empty queue.
    ///
    /// The minimum capacity is 1 (clamped).
    pub fn new(max_size: usize, policy: DropPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: BTreeMap::new(),
                arrivals: BTreeMap::new(),
                next_seq: 0,
                closed: false,
                dropped: 0,
                enqueued: 0,
                dequeued: 0,
                discarded: 0,
            }),
            notify: Notify::new(),
            emptied: Notify::new(),
            max_size: max_size.max(1),
            policy,
        }
    }

    /// Offers an event to the queue; returns `true` if it was admitted.
    ///
    /// When the queue is full the [`DropPolicy`] decides between evicting a
    /// queued event and refusing this one. A closed queue refuses everything.
    pub fn enqueue(&self, event: Event) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            trace!(event_id = %event.id, kind = %event.kind, "queue closed; event refused");
            return false;
        }

        if inner.items.len() >= self.max_size {
            let victim = match self.policy {
                DropPolicy::Reject => None,
                DropPolicy::Oldest => inner.oldest(),
                DropPolicy::LowestPriority => inner
                    .oldest_lowest()
                    .filter(|slot| event.priority() > slot.priority.0),
            };

            match victim.and_then(|slot| inner.remove(slot)) {
                Some(evicted) => {
                    inner.dropped += 1;
                    debug!(
                        evicted = %evicted.id,
                        evicted_kind = %evicted.kind,
                        policy = self.policy.as_label(),
                        "queue full; evicted event"
                    );
                }
                None => {
                    inner.dropped += 1;
                    debug!(
                        event_id = %event.id,
                        kind = %event.kind,
                        policy = self.policy.as_label(),
                        "queue full; event rejected"
                    );
                    return false;
                }
            }
        }

        trace!(event_id = %event.id, kind = %event.kind, level = %event.level, "event enqueued");
        inner.insert(event);
        drop(inner);
        self.notify.notify_one();
        true
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<Event> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(next) = self.take() {
                return next;
            }

            notified.await;
        }
    }

    /// Takes the next event without waiting.
    pub fn try_dequeue(&self) -> Option<Event> {
        self.take().flatten()
    }

    /// `Some(None)` when closed, `Some(Some(ev))` when an event was taken, `None` when empty.
    fn take(&self) -> Option<Option<Event>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Some(None);
        }
        let event = inner.pop()?;
        let now_empty = inner.items.is_empty();
        drop(inner);
        if now_empty {
            self.emptied.notify_waiters();
        }
        Some(Some(event))
    }

    /// Waits until no event is queued (or the queue is closed).
    pub async fn drained(&self) {
        loop {
            let notified = self.emptied.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let inner = self.inner.lock();
                if inner.closed || inner.items.is_empty() {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Closes the queue and wakes all waiting consumers.
    ///
    /// Events still queued are abandoned; their number is returned and added
    /// to `discarded_count`. Closing twice is a no-op returning `0`.
    pub fn close(&self) -> usize {
        let abandoned = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return 0;
            }
            inner.closed = true;
            let abandoned = inner.items.len();
            inner.items.clear();
            inner.arrivals.clear();
            inner.discarded += abandoned as u64;
            abandoned
        };
        self.notify.notify_waiters();
        self.emptied.notify_waiters();
        abandoned
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns `true` if no event is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity fixed at construction.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Overflow policy fixed at construction.
    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// Snapshot of the queue counters.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let current_size = inner.items.len();
        QueueStats {
            current_size,
            max_size: self.max_size,
            utilization: current_size as f64 / self.max_size as f64,
            dropped_count: inner.dropped,
            enqueued_count: inner.enqueued,
            dequeued_count: inner.dequeued,
            discarded_count: inner.discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Level;
    use std::sync::Arc;
    use std::time::Duration;

    fn ev(name: &str, level: Level) -> Event {
        Event::new("t").with_level(level).with_data("name", name)
    }

    fn drain_names(q: &BoundedPriorityQueue) -> Vec<String> {
        std::iter::from_fn(|| q.try_dequeue())
            .map(|e| e.data["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_priority_then_fifo() {
        let q = BoundedPriorityQueue::new(16, DropPolicy::Reject);
        assert!(q.enqueue(ev("emergency", Level::Emergency)));
        assert!(q.enqueue(ev("info-1", Level::Info)));
        assert!(q.enqueue(ev("warning", Level::Warning)));
        assert!(q.enqueue(ev("info-2", Level::Info)));

        assert_eq!(
            drain_names(&q),
            vec!["emergency", "warning", "info-1", "info-2"]
        );
    }

    #[test]
    fn test_reject_policy_refuses_when_full() {
        let q = BoundedPriorityQueue::new(2, DropPolicy::Reject);
        assert!(q.enqueue(ev("a", Level::Info)));
        assert!(q.enqueue(ev("b", Level::Info)));
        assert!(!q.enqueue(ev("c", Level::Emergency)));

        let stats = q.stats();
        assert_eq!(stats.current_size, 2);
        assert_eq!(stats.dropped_count, 1);
        assert_eq!(stats.enqueued_count, 2);
        assert_eq!(drain_names(&q), vec!["a", "b"]);
    }

    #[test]
    fn test_oldest_policy_evicts_longest_resident() {
        let q = BoundedPriorityQueue::new(2, DropPolicy::Oldest);
        assert!(q.enqueue(ev("old-emergency", Level::Emergency)));
        assert!(q.enqueue(ev("info", Level::Info)));
        assert!(q.enqueue(ev("debug", Level::Debug)));

        assert_eq!(q.stats().dropped_count, 1);
        assert_eq!(drain_names(&q), vec!["info", "debug"]);
    }

    #[test]
    fn test_lowest_priority_evicts_oldest_of_lowest() {
        let q = BoundedPriorityQueue::new(3, DropPolicy::LowestPriority);
        assert!(q.enqueue(ev("debug-1", Level::Debug)));
        assert!(q.enqueue(ev("error", Level::Error)));
        assert!(q.enqueue(ev("debug-2", Level::Debug)));
        assert!(q.enqueue(ev("warning", Level::Warning)));

        assert_eq!(q.stats().dropped_count, 1);
        assert_eq!(drain_names(&q), vec!["error", "warning", "debug-2"]);
    }

    #[test]
    fn test_lowest_priority_rejects_incoming_at_or_below_floor() {
        let q = BoundedPriorityQueue::new(2, DropPolicy::LowestPriority);
        assert!(q.enqueue(ev("w1", Level::Warning)));
        assert!(q.enqueue(ev("w2", Level::Warning)));

        assert!(!q.enqueue(ev("info", Level::Info)));
        assert!(!q.enqueue(ev("w3", Level::Warning)));

        let stats = q.stats();
        assert_eq!(stats.dropped_count, 2);
        assert_eq!(stats.current_size, 2);
        assert_eq!(drain_names(&q), vec!["w1", "w2"]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let levels = [
            Level::Info,
            Level::Debug,
            Level::Emergency,
            Level::Warning,
            Level::Debug,
            Level::Error,
            Level::Info,
            Level::Emergency,
            Level::Debug,
            Level::Warning,
        ];
        for policy in [DropPolicy::Oldest, DropPolicy::LowestPriority, DropPolicy::Reject] {
            let q = BoundedPriorityQueue::new(5, policy);
            for (i, level) in levels.iter().enumerate() {
                q.enqueue(ev(&i.to_string(), *level));
                assert!(q.len() <= 5, "{policy:?} overflowed");
            }
            let stats = q.stats();
            assert_eq!(stats.current_size, 5);
            assert_eq!(stats.utilization, 1.0);
            assert_eq!(stats.dropped_count, 5);
        }
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let q = Arc::new(BoundedPriorityQueue::new(4, DropPolicy::Reject));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(q.enqueue(ev("late", Level::Info)));

        let got = consumer.await.unwrap().unwrap();
        assert_eq!(got.data["name"], "late");
        assert_eq!(q.stats().dequeued_count, 1);
    }

    #[tokio::test]
    async fn test_close_wakes_all_waiters() {
        let q = Arc::new(BoundedPriorityQueue::new(4, DropPolicy::Reject));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                tokio::spawn(async move { q.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(q.close(), 0);

        for w in waiters {
            assert!(w.await.unwrap().is_none());
        }
        assert!(!q.enqueue(ev("after", Level::Emergency)));
    }

    #[tokio::test]
    async fn test_drained_resolves_when_consumers_catch_up() {
        let q = Arc::new(BoundedPriorityQueue::new(4, DropPolicy::Reject));
        q.enqueue(ev("a", Level::Info));
        q.enqueue(ev("b", Level::Info));

        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.drained().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        assert!(q.try_dequeue().is_some());
        assert!(q.dequeue().await.is_some());
        waiter.await.unwrap();

        // Already empty: returns immediately.
        q.drained().await;
    }

    #[test]
    fn test_close_abandons_queued_events() {
        let q = BoundedPriorityQueue::new(4, DropPolicy::Reject);
        q.enqueue(ev("a", Level::Info));
        q.enqueue(ev("b", Level::Info));

        assert_eq!(q.close(), 2);
        assert_eq!(q.close(), 0);
        assert!(q.try_dequeue().is_none());

        let stats = q.stats();
        assert_eq!(stats.current_size, 0);
        assert_eq!(stats.discarded_count, 2);
    }
}
