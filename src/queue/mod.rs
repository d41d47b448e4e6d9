//! Bounded priority queue with backpressure.
//!
//! ## Contents
//! - [`BoundedPriorityQueue`] priority-ordered, fixed-capacity, suspending `dequeue`
//! - [`DropPolicy`] overflow policy (`Oldest`, `LowestPriority`, `Reject`)
//! - [`QueueStats`] point-in-time counters
//!
//! Admission failures are never errors: `enqueue` returns `false`.

mod bounded;
mod policy;
mod stats;

pub use bounded::BoundedPriorityQueue;
pub use policy::DropPolicy;
pub use stats::QueueStats;
