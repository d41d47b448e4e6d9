//! Load-aware task dispatch across a fixed worker pool.
//!
//! ## Contents
//! - [`LoadAwareScheduler`] picks the least-loaded running worker and hands the item off
//! - [`Worker`], [`WorkerId`], [`WorkerState`] pool entries
//! - [`WorkItem`], [`TaskOutcome`], [`Completion`] explicit task results and retry state
//! - [`Handoff`] delivery seam, with [`ChannelHandoff`] and the [`EventBackend`](crate::EventBackend) impl
//!
//! Dispatch unavailability is not an error: `dispatch` returns `false` and the
//! caller decides whether to retry.

mod handoff;
#[allow(clippy::module_inception)]
mod scheduler;
mod task;
mod worker;

pub use handoff::{ChannelHandoff, Handoff, TASK_ASSIGNED};
pub use scheduler::{LoadAwareScheduler, SchedulerStats};
pub use task::{Completion, TaskOutcome, WorkItem};
pub use worker::{Worker, WorkerId, WorkerState};
