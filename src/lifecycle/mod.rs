//! Ordered startup and shutdown of dependent components.
//!
//! ## Contents
//! - [`Stage`], [`StageFn`], [`stage_fn`] a named start/stop pair with dependencies
//! - [`LifecycleManager`] topological startup, critical-stage rollback, reverse shutdown
//! - [`AgentLifecycleManager`] bus → master → workers topology over the manager
//! - [`wait_for_shutdown_signal`] OS termination signal listener

mod agent;
mod manager;
mod plan;
mod signal;
mod stage;

pub use agent::{AgentLifecycleManager, BUS_STAGE, MASTER_STAGE, worker_stage};
pub use manager::{LifecycleManager, LifecycleReport, LifecycleState};
pub use signal::wait_for_shutdown_signal;
pub use stage::{Stage, StageFn, StageFuture, stage_fn};
