use serde::{Deserialize, Serialize};

/// Identifier of a worker in the scheduler pool.
pub type WorkerId = u32;

/// Availability of a worker for new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl WorkerState {
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Paused => "paused",
        }
    }
}

/// Snapshot of one worker as seen by the scheduler.
///
/// Only `RUNNING` workers are eligible for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub state: WorkerState,
    /// Tasks assigned to the worker that have not signalled completion.
    pub pending_count: u64,
}

impl Worker {
    pub fn new(id: WorkerId, state: WorkerState) -> Self {
        Self {
            id,
            state,
            pending_count: 0,
        }
    }

    /// A running worker with nothing pending.
    pub fn running(id: WorkerId) -> Self {
        Self::new(id, WorkerState::Running)
    }

    /// Seeds the pending counter (restoring a pool, tests).
    pub fn with_pending(mut self, pending: u64) -> Self {
        self.pending_count = pending;
        self
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }
}
