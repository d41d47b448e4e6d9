use serde::Serialize;

use crate::queue::QueueStats;

/// Point-in-time snapshot returned by [`EventBackend::get_stats`](crate::EventBackend::get_stats).
///
/// Two snapshots taken with no intervening activity compare equal.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BackendStats {
    /// Queue counters.
    pub queue: QueueStats,
    /// Events admitted by `publish`.
    pub published_count: u64,
    /// Events taken off the queue and dispatched.
    pub processed_count: u64,
    /// Handler invocations that failed or panicked.
    pub error_count: u64,
    /// Live subscriptions.
    pub subscription_count: usize,
}
