//! # Hand-off of work items to workers.
//!
//! The scheduler only decides *which* worker gets an item; a [`Handoff`]
//! decides *how* the item reaches it.
//!
//! - [`EventBackend`] publishes a [`TASK_ASSIGNED`] event carrying the worker id and the item.
//! - [`ChannelHandoff`] pushes into one bounded `mpsc` queue per worker.
//!
//! ```text
//! LoadAwareScheduler::dispatch(item)
//!     ├─ pick worker (min pending)
//!     ├─ pending += 1
//!     └─ handoff.hand_off(worker, item) ── false ──► pending -= 1, dispatch → false
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{WorkItem, WorkerId};
use crate::backend::EventBackend;
use crate::events::Event;

/// Event kind published by the [`EventBackend`] hand-off.
pub const TASK_ASSIGNED: &str = "task.assigned";

/// Delivers a work item to the selected worker.
#[async_trait]
pub trait Handoff: Send + Sync + 'static {
    /// Returns `true` if the worker received the item.
    async fn hand_off(&self, worker: WorkerId, item: WorkItem) -> bool;
}

#[async_trait]
impl Handoff for EventBackend {
    async fn hand_off(&self, worker: WorkerId, item: WorkItem) -> bool {
        let event = Event::new(TASK_ASSIGNED)
            .with_source("scheduler")
            .with_data("worker_id", worker)
            .with_data("task_id", item.id)
            .with_data("attempts", item.attempts)
            .with_data("payload", item.payload);
        self.publish(event)
    }
}

/// One bounded queue per worker.
///
/// Sending never waits: a full or closed queue refuses the item.
pub struct ChannelHandoff {
    senders: HashMap<WorkerId, mpsc::Sender<WorkItem>>,
}

impl ChannelHandoff {
    /// Creates a queue of `capacity` (min 1) for each worker id and returns the receiving ends.
    pub fn new(
        workers: impl IntoIterator<Item = WorkerId>,
        capacity: usize,
    ) -> (Self, HashMap<WorkerId, mpsc::Receiver<WorkItem>>) {
        let cap = capacity.max(1);
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for id in workers {
            let (tx, rx) = mpsc::channel(cap);
            senders.insert(id, tx);
            receivers.insert(id, rx);
        }
        (Self { senders }, receivers)
    }
}

#[async_trait]
impl Handoff for ChannelHandoff {
    async fn hand_off(&self, worker: WorkerId, item: WorkItem) -> bool {
        let Some(tx) = self.senders.get(&worker) else {
            debug!(worker, task_id = %item.id, "no channel for worker");
            return false;
        };
        match tx.try_send(item) {
            Ok(()) => true,
            Err(err) => {
                trace!(worker, reason = %err, "worker channel refused item");
                false
            }
        }
    }
}

impl std::fmt::Debug for ChannelHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandoff")
            .field("workers", &self.senders.len())
            .finish()
    }
}
