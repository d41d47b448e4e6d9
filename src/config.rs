//! # Runtime configuration.
//!
//! Provides centralized settings for the three runtime components:
//! - [`BackendConfig`] for the [`EventBackend`](crate::EventBackend) (workers, queue, shutdown)
//! - [`LifecycleConfig`] for the [`LifecycleManager`](crate::LifecycleManager)
//! - [`SchedulerConfig`] for the [`LoadAwareScheduler`](crate::LoadAwareScheduler)
//!
//! Loading these from files or the command line is left to the embedding
//! application; every struct derives `serde` traits for that purpose.
//!
//! ## Sentinel values
//! - `drain_window = 0s` → close the queue immediately on stop
//! - `default_stage_timeout = 0s` → stages without an explicit timeout never time out
//! - `num_workers = 0` / `queue_capacity = 0` → clamped to 1

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::DropPolicy;

/// Configuration for the event backend.
///
/// ## Field semantics
/// - `num_workers`: concurrent dequeue → dispatch loops (min 1)
/// - `queue_capacity`: maximum number of queued events (min 1)
/// - `drop_policy`: what to do when the queue is full
/// - `drain_window`: how long `stop()` lets workers drain the queue before closing it
/// - `grace`: how long `stop()` waits for in-flight handlers after closing the queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Number of dispatch workers.
    pub num_workers: usize,

    /// Capacity of the priority queue.
    pub queue_capacity: usize,

    /// Overflow policy of the priority queue.
    pub drop_policy: DropPolicy,

    /// Maximum time to keep dispatching queued events after `stop()` is called.
    ///
    /// New publishes are refused as soon as `stop()` starts. When the window
    /// elapses, the queue is closed and any events still queued are abandoned.
    pub drain_window: Duration,

    /// Maximum time to wait for in-flight handler invocations once the queue is closed.
    ///
    /// Workers still running after `grace` are force-stopped and `stop()`
    /// returns [`BackendError::GraceExceeded`](crate::BackendError::GraceExceeded).
    pub grace: Duration,
}

impl BackendConfig {
    /// Returns the worker count clamped to a minimum of 1.
    #[inline]
    pub fn workers_clamped(&self) -> usize {
        self.num_workers.max(1)
    }

    /// Returns the queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Returns the drain window as an `Option`.
    ///
    /// - `None` → close the queue immediately
    /// - `Some(d)` → drain for at most `d`
    #[inline]
    pub fn drain_window_opt(&self) -> Option<Duration> {
        if self.drain_window == Duration::ZERO {
            None
        } else {
            Some(self.drain_window)
        }
    }
}

impl Default for BackendConfig {
    /// Default configuration:
    ///
    /// - `num_workers = 4`
    /// - `queue_capacity = 1024`
    /// - `drop_policy = DropPolicy::LowestPriority`
    /// - `drain_window = 5s`
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_capacity: 1024,
            drop_policy: DropPolicy::LowestPriority,
            drain_window: Duration::from_secs(5),
            grace: Duration::from_secs(30),
        }
    }
}

/// Configuration for the lifecycle manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Stop stages in reverse start order (`true`, default) or in start order (`false`).
    pub stop_order_reversed: bool,

    /// Timeout applied to stages registered without their own timeout.
    ///
    /// `Duration::ZERO` = no timeout.
    pub default_stage_timeout: Duration,

    /// Whether a stage's timeout also bounds its `stop_fn`.
    pub timeout_applies_to_stop: bool,
}

impl LifecycleConfig {
    /// Returns the default stage timeout as an `Option`.
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        if self.default_stage_timeout == Duration::ZERO {
            None
        } else {
            Some(self.default_stage_timeout)
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_order_reversed: true,
            default_stage_timeout: Duration::ZERO,
            timeout_applies_to_stop: true,
        }
    }
}

/// Configuration for the load-aware scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of attempts for a work item reported as `TaskOutcome::Retry`.
    ///
    /// An item that has already been attempted `max_attempts` times is counted
    /// as failed instead of being dispatched again.
    pub max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}
