//! # agentbus
//!
//! **agentbus** is an in-process event bus and task-dispatch core for
//! multi-agent runtimes.
//!
//! It provides a priority-ordered, bounded event queue drained by a pool of
//! dispatch workers, topic subscriptions with three propagation modes, a
//! load-aware scheduler that assigns work items to the least-loaded worker,
//! and a lifecycle manager that starts dependent components in order and
//! rolls them back on failure.
//!
//! ## Architecture
//! ### Event path
//! ```text
//!   producers (REST handlers, tool executors, scheduler hand-off, ...)
//!        │ publish(event) -> bool
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBackend                                                     │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │ BoundedPriorityQueue  (priority desc, FIFO within priority) │  │
//! │  │   full → DropPolicy: Oldest | LowestPriority | Reject       │  │
//! │  └──────────────┬───────────────┬───────────────┬──────────────┘  │
//! │                 ▼               ▼               ▼                 │
//! │             worker 1        worker 2   ...  worker N   (dequeue)  │
//! │                 └───────────────┼───────────────┘                 │
//! │                                 ▼                                 │
//! │  Dispatcher ── SubscriberRegistry (per topic, one lock)           │
//! │     ├─ Broadcast   → every matching subscriber                    │
//! │     ├─ Competing   → one: fewest deliveries, ties round-robin     │
//! │     └─ RoundRobin  → one: next in registration order              │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                     handlers (errors + panics isolated)
//! ```
//!
//! ### Task path
//! ```text
//! coordinator ── dispatch(item) ──► LoadAwareScheduler
//!                                     ├─ least pending among RUNNING workers (lowest id on ties)
//!                                     ├─ pending += 1
//!                                     └─ Handoff (EventBackend "task.assigned" | ChannelHandoff)
//! worker ── complete(worker, task, outcome) ──► pending -= 1 → Done | Failed | NeedsHelp | Retried
//! ```
//!
//! ### Lifecycle
//! ```text
//! LifecycleManager:  Idle → Starting → Running → Stopping → ShutdownComplete
//!                              └── critical stage failed → rollback → RolledBack
//!
//! AgentLifecycleManager:  message_bus → master → worker-0 … worker-N   (shutdown reversed)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                                |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------------|
//! | **Events**        | Immutable messages routed by kind, prioritised by level.      | [`Event`], [`Level`]                              |
//! | **Queue**         | Bounded priority queue with overflow policies.                | [`BoundedPriorityQueue`], [`DropPolicy`]          |
//! | **Dispatch**      | Topic subscriptions, filters, propagation modes.              | [`Handle`], [`HandlerFn`], [`PropagationMode`]    |
//! | **Backend**       | Worker pool, graceful stop, stats.                            | [`EventBackend`], [`BackendStats`]                |
//! | **Scheduling**    | Least-loaded worker selection, explicit retry/escalation.     | [`LoadAwareScheduler`], [`Handoff`], [`TaskOutcome`] |
//! | **Lifecycle**     | Ordered startup, rollback, reverse shutdown.                  | [`LifecycleManager`], [`AgentLifecycleManager`]   |
//! | **Errors**        | Typed errors with stable labels.                              | [`BackendError`], [`LifecycleError`]              |
//! | **Configuration** | Plain serde-friendly settings.                                | [`BackendConfig`], [`LifecycleConfig`]            |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a handler that logs events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use agentbus::{BackendConfig, Event, EventBackend, Level, PropagationMode};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = EventBackend::new(BackendConfig::default());
//!
//!     backend.subscribe_fn("tool.completed", PropagationMode::Broadcast, |ev: Arc<Event>| async move {
//!         println!("{} finished", ev.data["tool"]);
//!         Ok(())
//!     });
//!
//!     backend.start().await?;
//!     let admitted = backend.publish(
//!         Event::new("tool.completed")
//!             .with_level(Level::Info)
//!             .with_data("tool", "read_file"),
//!     );
//!     assert!(admitted);
//!
//!     backend.stop().await?;
//!     assert_eq!(backend.get_stats().processed_count, 1);
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod dispatch;
mod error;
mod events;
mod handlers;
mod lifecycle;
mod queue;
mod scheduler;

// ---- Public re-exports ----

pub use backend::{BackendState, BackendStats, EventBackend};
pub use config::{BackendConfig, LifecycleConfig, SchedulerConfig};
pub use dispatch::{
    DispatchOutcome, Dispatcher, EventFilter, Handle, HandlerFn, HandlerRef, PropagationMode,
    Subscription, SubscriptionId,
};
pub use error::{BackendError, HandlerError, LifecycleError, StageError};
pub use events::{Event, Level};
pub use lifecycle::{
    AgentLifecycleManager, BUS_STAGE, LifecycleManager, LifecycleReport, LifecycleState,
    MASTER_STAGE, Stage, StageFn, StageFuture, stage_fn, wait_for_shutdown_signal, worker_stage,
};
pub use queue::{BoundedPriorityQueue, DropPolicy, QueueStats};
pub use scheduler::{
    ChannelHandoff, Completion, Handoff, LoadAwareScheduler, SchedulerStats, TASK_ASSIGNED,
    TaskOutcome, WorkItem, Worker, WorkerId, WorkerState,
};

// Optional: built-in logging handler.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use handlers::LogWriter;
