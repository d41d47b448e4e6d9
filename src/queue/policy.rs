//! # Overflow policy of the bounded priority queue
//!
//! When the queue holds `max_size` events and another one is enqueued,
//! the drop policy decides which event is lost.
//!
//! ## Variants
//! - `Oldest`: evict the longest-resident event regardless of priority, admit the new one.
//! - `LowestPriority`: evict the oldest of the lowest-priority events; if the incoming
//!   event is not above that priority, **reject** it instead.
//! - `Reject`: always refuse the incoming event.
//!
//! ## Invariants
//! - The queue never holds more than `max_size` events.
//! - Every evicted or rejected event increments `dropped_count` exactly once.

use serde::{Deserialize, Serialize};

/// Policy applied by [`BoundedPriorityQueue::enqueue`](super::BoundedPriorityQueue::enqueue)
/// when the queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DropPolicy {
    /// Evict the longest-resident event.
    ///
    /// Use when:
    /// - Fresh events matter more than old ones
    /// - Example: progress/telemetry streams
    Oldest,

    /// Evict the oldest event of the lowest queued priority, or reject the
    /// incoming event if its priority is not above it.
    ///
    /// Use when:
    /// - Important events must survive bursts of noise
    /// - Example: mixed debug chatter and emergency signals on one bus
    #[default]
    LowestPriority,

    /// Refuse the incoming event.
    ///
    /// Use when:
    /// - Already accepted work must never be lost
    /// - Producers handle the `false` return themselves
    Reject,
}

impl DropPolicy {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DropPolicy::Oldest => "oldest",
            DropPolicy::LowestPriority => "lowest_priority",
            DropPolicy::Reject => "reject",
        }
    }
}
