//! # EventBackend: queue + dispatcher + worker pool.
//!
//! ## Architecture
//! ```text
//! publish(ev) ──► BoundedPriorityQueue ──► worker 1 ─┐
//!                  (DropPolicy on full)  ├─► worker 2 ─┼─► Dispatcher::dispatch(ev) ──► handlers
//!                                        └─► worker N ─┘
//! ```
//!
//! ## Stop sequence
//! ```text
//! stop()
//!   ├─► refuse new publishes
//!   ├─► drain: workers keep dispatching until the queue is empty (≤ drain_window)
//!   ├─► queue.close()          → leftover events abandoned, dequeue() wakes with None
//!   ├─► wait workers (≤ grace) → in-flight handlers finish
//!   │     └─ timeout → token.cancel() + abort → Err(GraceExceeded)
//!   └─► clear subscriptions
//! ```
//!
//! ## Rules
//! - `Created → Started → Stopped`; a stopped backend cannot be restarted.
//! - `publish` is accepted before `start` (events wait in the queue) and refused once `stop` begins.
//! - Handler failures never reach the publisher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::BackendStats;
use crate::config::BackendConfig;
use crate::dispatch::{
    Dispatcher, EventFilter, Handle, HandlerFn, HandlerRef, PropagationMode, SubscriptionId,
};
use crate::error::{BackendError, HandlerError};
use crate::events::Event;
use crate::queue::BoundedPriorityQueue;

/// Lifecycle state of an [`EventBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BackendState {
    Created,
    Started,
    Stopped,
}

/// In-process publish/subscribe broker.
///
/// Construct once at the composition root and share it by `Arc`.
pub struct EventBackend {
    cfg: BackendConfig,
    queue: Arc<BoundedPriorityQueue>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<BackendState>,
    accepting: AtomicBool,
    published: AtomicU64,
    workers: Mutex<Option<JoinSet<()>>>,
    token: CancellationToken,
}

impl EventBackend {
    /// Creates a backend in the `Created` state; no worker runs yet.
    pub fn new(cfg: BackendConfig) -> Self {
        let queue = Arc::new(BoundedPriorityQueue::new(
            cfg.capacity_clamped(),
            cfg.drop_policy,
        ));
        Self {
            cfg,
            queue,
            dispatcher: Arc::new(Dispatcher::new()),
            state: Mutex::new(BackendState::Created),
            accepting: AtomicBool::new(true),
            published: AtomicU64::new(0),
            workers: Mutex::new(None),
            token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.cfg
    }

    pub fn state(&self) -> BackendState {
        *self.state.lock()
    }

    /// Spawns `num_workers` dispatch loops.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) -> Result<(), BackendError> {
        {
            let mut state = self.state.lock();
            match *state {
                BackendState::Started => return Err(BackendError::AlreadyStarted),
                BackendState::Stopped => return Err(BackendError::AlreadyStopped),
                BackendState::Created => *state = BackendState::Started,
            }
        }

        let n = self.cfg.workers_clamped();
        let mut set = JoinSet::new();
        for idx in 0..n {
            set.spawn(worker_loop(
                idx,
                Arc::clone(&self.queue),
                Arc::clone(&self.dispatcher),
                self.token.child_token(),
            ));
        }
        *self.workers.lock() = Some(set);

        info!(
            workers = n,
            capacity = self.queue.capacity(),
            policy = self.queue.policy().as_label(),
            buffered = self.queue.len(),
            "event backend started"
        );
        Ok(())
    }

    /// Gracefully stops the backend.
    ///
    /// Returns [`BackendError::GraceExceeded`] if workers had to be forced to exit.
    pub async fn stop(&self) -> Result<(), BackendError> {
        {
            let mut state = self.state.lock();
            match *state {
                BackendState::Created => return Err(BackendError::NotStarted),
                BackendState::Stopped => return Err(BackendError::AlreadyStopped),
                BackendState::Started => *state = BackendState::Stopped,
            }
        }
        self.accepting.store(false, Ordering::Release);
        info!(queued = self.queue.len(), "event backend stopping");

        if let Some(window) = self.cfg.drain_window_opt() {
            if tokio::time::timeout(window, self.queue.drained()).await.is_err() {
                warn!(
                    window = ?window,
                    queued = self.queue.len(),
                    "drain window elapsed with events still queued"
                );
            }
        }

        let abandoned = self.queue.close();
        if abandoned > 0 {
            warn!(abandoned, "queued events abandoned at stop");
        }

        let workers = self.workers.lock().take();
        let result = match workers {
            Some(mut set) => self.wait_all_with_grace(&mut set).await,
            None => Ok(()),
        };

        let cleared = self.dispatcher.clear();
        debug!(cleared, "subscriptions cleared");
        if result.is_ok() {
            info!("event backend stopped");
        }
        result
    }

    /// Waits for all workers within the configured grace period.
    async fn wait_all_with_grace(&self, set: &mut JoinSet<()>) -> Result<(), BackendError> {
        let grace = self.cfg.grace;
        let done = async { while set.join_next().await.is_some() {} };

        match tokio::time::timeout(grace, done).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let stuck = set.len();
                error!(grace = ?grace, stuck, "shutdown grace exceeded; forcing workers to exit");
                self.token.cancel();
                set.abort_all();
                while set.join_next().await.is_some() {}
                Err(BackendError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Offers an event to the queue; returns `true` if it was admitted.
    ///
    /// Never fails loudly: a full queue or a stopping backend yields `false`.
    pub fn publish(&self, event: Event) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            trace!(event_id = %event.id, kind = %event.kind, "backend stopping; publish refused");
            return false;
        }
        let admitted = self.queue.enqueue(event);
        if admitted {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    /// Registers `handler` on `topic` without a filter.
    pub fn subscribe(
        &self,
        topic: impl Into<Arc<str>>,
        handler: HandlerRef,
        mode: PropagationMode,
    ) -> SubscriptionId {
        self.dispatcher.subscribe(topic, handler, mode, None)
    }

    /// Registers `handler` on `topic` with an optional filter predicate.
    pub fn subscribe_with(
        &self,
        topic: impl Into<Arc<str>>,
        handler: HandlerRef,
        mode: PropagationMode,
        filter: Option<EventFilter>,
    ) -> SubscriptionId {
        self.dispatcher.subscribe(topic, handler, mode, filter)
    }

    /// Registers a closure as a handler on `topic`.
    ///
    /// The topic doubles as the handler name in logs.
    pub fn subscribe_fn<F, Fut>(
        &self,
        topic: impl Into<Arc<str>>,
        mode: PropagationMode,
        f: F,
    ) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let topic: Arc<str> = topic.into();
        let handler: Arc<dyn Handle> = HandlerFn::arc(topic.to_string(), f);
        self.dispatcher.subscribe(topic, handler, mode, None)
    }

    /// Removes a subscription; returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// The dispatcher owned by this backend.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Snapshot of the backend counters.
    pub fn get_stats(&self) -> BackendStats {
        BackendStats {
            queue: self.queue.stats(),
            published_count: self.published.load(Ordering::Relaxed),
            processed_count: self.dispatcher.processed_count(),
            error_count: self.dispatcher.error_count(),
            subscription_count: self.dispatcher.subscription_count(),
        }
    }
}

impl Drop for EventBackend {
    fn drop(&mut self) {
        self.queue.close();
        self.token.cancel();
    }
}

impl std::fmt::Debug for EventBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBackend")
            .field("state", &self.state())
            .field("workers", &self.cfg.workers_clamped())
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Dequeue → dispatch → repeat, until the queue closes or the token fires.
async fn worker_loop(
    idx: usize,
    queue: Arc<BoundedPriorityQueue>,
    dispatcher: Arc<Dispatcher>,
    token: CancellationToken,
) {
    debug!(worker = idx, "dispatch worker started");
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = queue.dequeue() => match next {
                Some(event) => event,
                None => break,
            },
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = dispatcher.dispatch(event) => {}
        }
    }
    debug!(worker = idx, "dispatch worker exited");
}
