//! Work items and their completion outcomes.
//!
//! Retry and escalation are explicit values rather than control flow: a
//! worker reports a [`TaskOutcome`], the scheduler answers with a
//! [`Completion`] telling the caller what happened to the item.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WorkerId;

/// Unit of work handed to a worker. The payload is opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub payload: Value,
    /// Dispatch attempt this item is on, starting at 1.
    pub attempts: u32,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            attempts: 1,
        }
    }
}

/// What a worker reports when it finishes with an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// The item was processed.
    Done,
    /// The item failed permanently.
    Failed { reason: String },
    /// The worker cannot proceed without outside help.
    NeedsHelp { context: String },
    /// The item should be attempted again.
    Retry,
}

impl TaskOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskOutcome::Done => "done",
            TaskOutcome::Failed { .. } => "failed",
            TaskOutcome::NeedsHelp { .. } => "needs_help",
            TaskOutcome::Retry => "retry",
        }
    }
}

/// Scheduler's answer to a completion signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Item finished.
    Done,
    /// Item failed permanently.
    Failed { reason: String },
    /// Item is handed back to the caller for escalation.
    NeedsHelp { item: WorkItem, context: String },
    /// Item was dispatched again.
    Retried { worker: WorkerId, attempts: u32 },
    /// A retry was requested but the attempt budget is spent.
    Exhausted { item: WorkItem },
    /// A retry was requested but no running worker accepted it.
    Unassigned { item: WorkItem },
    /// The task id is not in flight (never dispatched or already completed).
    /// No counter was touched.
    Unknown { task_id: String },
}
