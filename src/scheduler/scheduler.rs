//! # LoadAwareScheduler: least-loaded worker selection.
//!
//! ## Rules
//! - Only `RUNNING` workers are eligible; stale counters of stopped/paused workers are ignored.
//! - Minimum `pending_count` wins; ties go to the lowest worker id.
//! - `dispatch` increments the chosen worker's counter before hand-off and reverts it
//!   if the hand-off fails. No worker ⇒ `false`, no mutation.
//! - `complete` decrements the counter of the worker the task was assigned to,
//!   never below zero. A task id that is not in flight changes nothing.
//! - At most one dispatch per task id is in flight; a duplicate id is refused.
//! - A `Retry` outcome re-dispatches the same item while `attempts < max_attempts`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Completion, Handoff, TaskOutcome, WorkItem, Worker, WorkerId, WorkerState};
use crate::config::SchedulerConfig;

/// Counter snapshot returned by [`LoadAwareScheduler::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Successful hand-offs, retries included.
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub needs_help: u64,
    pub retried: u64,
    /// Dispatches refused (no running worker or hand-off failure).
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    needs_help: AtomicU64,
    retried: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Assigns work items to the least-loaded running worker.
pub struct LoadAwareScheduler {
    cfg: SchedulerConfig,
    /// Kept sorted by id.
    workers: Mutex<Vec<Worker>>,
    /// Items handed off and not yet completed, by task id.
    inflight: Mutex<HashMap<String, (WorkerId, WorkItem)>>,
    handoff: Arc<dyn Handoff>,
    counters: Counters,
}

impl LoadAwareScheduler {
    /// Creates a scheduler with an empty pool.
    pub fn new(handoff: Arc<dyn Handoff>, cfg: SchedulerConfig) -> Self {
        Self {
            cfg,
            workers: Mutex::new(Vec::new()),
            inflight: Mutex::new(HashMap::new()),
            handoff,
            counters: Counters::default(),
        }
    }

    /// Creates a scheduler with the given pool.
    ///
    /// Later entries replace earlier ones with the same id.
    pub fn with_workers(
        handoff: Arc<dyn Handoff>,
        cfg: SchedulerConfig,
        workers: impl IntoIterator<Item = Worker>,
    ) -> Self {
        let scheduler = Self::new(handoff, cfg);
        for w in workers {
            scheduler.add_worker(w);
        }
        scheduler
    }

    /// Adds a worker to the pool, replacing any worker with the same id.
    pub fn add_worker(&self, worker: Worker) {
        let mut workers = self.workers.lock();
        match workers.binary_search_by_key(&worker.id, |w| w.id) {
            Ok(pos) => workers[pos] = worker,
            Err(pos) => workers.insert(pos, worker),
        }
    }

    /// Changes a worker's state; returns `false` for an unknown id.
    pub fn set_state(&self, id: WorkerId, state: WorkerState) -> bool {
        let mut workers = self.workers.lock();
        let Some(w) = workers.iter_mut().find(|w| w.id == id) else {
            return false;
        };
        if w.state != state {
            debug!(
                worker = id,
                from = w.state.as_label(),
                to = state.as_label(),
                "worker state changed"
            );
            w.state = state;
        }
        true
    }

    /// Snapshot of the pool, ordered by id.
    pub fn workers(&self) -> Vec<Worker> {
        self.workers.lock().clone()
    }

    pub fn worker(&self, id: WorkerId) -> Option<Worker> {
        self.workers.lock().iter().find(|w| w.id == id).cloned()
    }

    /// The running worker with the fewest pending tasks (lowest id on ties).
    pub fn select_worker(&self) -> Option<Worker> {
        Self::least_loaded(&self.workers.lock()).cloned()
    }

    fn least_loaded(workers: &[Worker]) -> Option<&Worker> {
        // `min_by_key` keeps the first minimum; workers are sorted by id.
        workers
            .iter()
            .filter(|w| w.is_running())
            .min_by_key(|w| w.pending_count)
    }

    /// Assigns `item` to the least-loaded running worker.
    ///
    /// Returns `false` if no worker is running or the hand-off failed.
    pub async fn dispatch(&self, item: WorkItem) -> bool {
        self.assign(item).await.is_some()
    }

    async fn assign(&self, item: WorkItem) -> Option<WorkerId> {
        let worker = {
            let mut inflight = self.inflight.lock();
            if inflight.contains_key(&item.id) {
                Counters::bump(&self.counters.rejected);
                warn!(task_id = %item.id, "task already in flight; dispatch refused");
                return None;
            }
            let mut workers = self.workers.lock();
            let id = Self::least_loaded(&workers).map(|w| w.id);
            let Some(w) = id.and_then(|id| workers.iter_mut().find(|w| w.id == id)) else {
                Counters::bump(&self.counters.rejected);
                warn!(task_id = %item.id, "no running worker; dispatch refused");
                return None;
            };
            w.pending_count += 1;
            inflight.insert(item.id.clone(), (w.id, item.clone()));
            w.id
        };

        let task_id = item.id.clone();
        let attempts = item.attempts;
        if !self.handoff.hand_off(worker, item).await {
            self.inflight.lock().remove(&task_id);
            self.release(worker);
            Counters::bump(&self.counters.rejected);
            warn!(worker, task_id = %task_id, "hand-off refused; dispatch reverted");
            return None;
        }

        Counters::bump(&self.counters.dispatched);
        debug!(worker, task_id = %task_id, attempts, "task dispatched");
        Some(worker)
    }

    /// Decrements a worker's pending counter, saturating at zero.
    fn release(&self, id: WorkerId) {
        if let Some(w) = self.workers.lock().iter_mut().find(|w| w.id == id) {
            w.pending_count = w.pending_count.saturating_sub(1);
        }
    }

    /// Signals that `worker` finished `task_id` with `outcome`.
    ///
    /// The pending counter released is the one of the worker the task was
    /// assigned to, which is normally `worker`.
    pub async fn complete(&self, worker: WorkerId, task_id: &str, outcome: TaskOutcome) -> Completion {
        let Some((assigned, mut item)) = self.inflight.lock().remove(task_id) else {
            warn!(worker, task_id, outcome = outcome.as_label(), "completion for a task not in flight");
            return Completion::Unknown {
                task_id: task_id.to_string(),
            };
        };
        if assigned != worker {
            warn!(worker, assigned, task_id, "completion reported by a different worker");
        }
        self.release(assigned);
        debug!(worker = assigned, task_id, outcome = outcome.as_label(), "task completed");

        match outcome {
            TaskOutcome::Done => {
                Counters::bump(&self.counters.completed);
                Completion::Done
            }
            TaskOutcome::Failed { reason } => {
                Counters::bump(&self.counters.failed);
                warn!(worker, task_id, reason = %reason, "task failed");
                Completion::Failed { reason }
            }
            TaskOutcome::NeedsHelp { context } => {
                Counters::bump(&self.counters.needs_help);
                info!(worker, task_id, "task needs help");
                Completion::NeedsHelp { item, context }
            }
            TaskOutcome::Retry => {
                if item.attempts >= self.cfg.max_attempts {
                    Counters::bump(&self.counters.failed);
                    warn!(worker, task_id, attempts = item.attempts, "retry budget exhausted");
                    return Completion::Exhausted { item };
                }
                item.attempts += 1;
                let attempts = item.attempts;
                match self.assign(item.clone()).await {
                    Some(next) => {
                        Counters::bump(&self.counters.retried);
                        Completion::Retried {
                            worker: next,
                            attempts,
                        }
                    }
                    None => Completion::Unassigned { item },
                }
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.counters;
        SchedulerStats {
            dispatched: c.dispatched.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            needs_help: c.needs_help.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for LoadAwareScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inflight = self.inflight.lock().len();
        let workers = self.workers.lock().len();
        f.debug_struct("LoadAwareScheduler")
            .field("workers", &workers)
            .field("inflight", &inflight)
            .field("max_attempts", &self.cfg.max_attempts)
            .finish()
    }
}
