use serde::Serialize;

/// Point-in-time counters of a [`BoundedPriorityQueue`](super::BoundedPriorityQueue).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueueStats {
    /// Events currently queued.
    pub current_size: usize,
    /// Queue capacity.
    pub max_size: usize,
    /// `current_size / max_size`.
    pub utilization: f64,
    /// Events evicted or rejected by the drop policy.
    pub dropped_count: u64,
    /// Events admitted into the queue.
    pub enqueued_count: u64,
    /// Events handed to a worker.
    pub dequeued_count: u64,
    /// Events still queued when the queue was closed.
    pub discarded_count: u64,
}
