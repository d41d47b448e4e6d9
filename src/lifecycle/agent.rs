//! # AgentLifecycleManager: bus → master → workers.
//!
//! A fixed two-tier topology on top of [`LifecycleManager`]:
//!
//! ```text
//! message_bus ──► master ──► worker-0
//!                        ├─► worker-1
//!                        └─► worker-N
//! ```
//!
//! Workers start sequentially in registration order once the master is up;
//! shutdown runs in reverse. The bus and master stages are critical; worker
//! stages are critical unless [`workers_critical(false)`](AgentLifecycleManager::workers_critical)
//! is set, in which case a failed worker is skipped and the fleet comes up without it.
//!
//! With a [`LoadAwareScheduler`] attached, each worker is marked `Running` in
//! the scheduler right after its stage starts and `Stopped` right before its
//! stage stops, so task dispatch only targets live workers.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use agentbus::{AgentLifecycleManager, BackendConfig, EventBackend, LifecycleConfig, StageError};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(EventBackend::new(BackendConfig::default()));
//! let mut fleet = AgentLifecycleManager::for_backend(LifecycleConfig::default(), backend)
//!     .master(|| async { Ok::<_, StageError>(()) }, || async { Ok::<_, StageError>(()) })
//!     .worker(0, || async { Ok(()) }, || async { Ok(()) })
//!     .worker(1, || async { Ok(()) }, || async { Ok(()) });
//!
//! if fleet.startup().await? {
//!     fleet.shutdown().await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::manager::{LifecycleManager, LifecycleReport, LifecycleState};
use super::stage::{Stage, StageFn, StageFuture, stage_fn};
use crate::backend::EventBackend;
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, StageError};
use crate::scheduler::{LoadAwareScheduler, Worker, WorkerId, WorkerState};

/// Name of the message-bus stage.
pub const BUS_STAGE: &str = "message_bus";
/// Name of the coordinator stage.
pub const MASTER_STAGE: &str = "master";

/// Stage name of a worker.
pub fn worker_stage(id: WorkerId) -> String {
    format!("worker-{id}")
}

fn noop() -> StageFn {
    stage_fn(|| async { Ok(()) })
}

/// Bus, master and worker stages managed as one fleet.
pub struct AgentLifecycleManager {
    inner: LifecycleManager,
    bus: (StageFn, StageFn),
    master: (StageFn, StageFn),
    workers: Vec<(WorkerId, StageFn, StageFn)>,
    workers_critical: bool,
    scheduler: Option<Arc<LoadAwareScheduler>>,
    built: bool,
}

impl AgentLifecycleManager {
    /// Creates a fleet whose bus and master stages do nothing until configured.
    pub fn new(cfg: LifecycleConfig) -> Self {
        Self {
            inner: LifecycleManager::new(cfg),
            bus: (noop(), noop()),
            master: (noop(), noop()),
            workers: Vec::new(),
            workers_critical: true,
            scheduler: None,
            built: false,
        }
    }

    /// Creates a fleet whose bus stage starts and stops `backend`.
    pub fn for_backend(cfg: LifecycleConfig, backend: Arc<EventBackend>) -> Self {
        let (b1, b2) = (Arc::clone(&backend), backend);
        Self::new(cfg).bus(
            move || {
                let backend = Arc::clone(&b1);
                async move { backend.start().await.map_err(StageError::failed) }
            },
            move || {
                let backend = Arc::clone(&b2);
                async move { backend.stop().await.map_err(StageError::failed) }
            },
        )
    }

    /// Sets the message-bus stage functions.
    pub fn bus<S, SFut, T, TFut>(mut self, start: S, stop: T) -> Self
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), StageError>> + Send + 'static,
        T: Fn() -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        self.bus = (stage_fn(start), stage_fn(stop));
        self
    }

    /// Sets the coordinator stage functions.
    pub fn master<S, SFut, T, TFut>(mut self, start: S, stop: T) -> Self
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), StageError>> + Send + 'static,
        T: Fn() -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        self.master = (stage_fn(start), stage_fn(stop));
        self
    }

    /// Adds a worker stage. Workers start in the order they are added.
    pub fn worker<S, SFut, T, TFut>(mut self, id: WorkerId, start: S, stop: T) -> Self
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), StageError>> + Send + 'static,
        T: Fn() -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        self.workers.push((id, stage_fn(start), stage_fn(stop)));
        self
    }

    /// Whether a worker startup failure rolls back the whole fleet (default `true`).
    pub fn workers_critical(mut self, critical: bool) -> Self {
        self.workers_critical = critical;
        self
    }

    /// Keeps worker states in `scheduler` in step with the worker stages.
    pub fn with_scheduler(mut self, scheduler: Arc<LoadAwareScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Registers a callback run once at shutdown.
    pub fn on_shutdown<F, Fut>(&mut self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.on_shutdown(callback);
    }

    /// Registers the fleet's stages on a fresh manager and swaps it in only
    /// once every stage was accepted, so a refused graph leaves nothing behind.
    fn build(&mut self) -> Result<(), LifecycleError> {
        if self.built {
            return Ok(());
        }

        let mut staged = LifecycleManager::new(self.inner.config().clone());
        let (bus_start, bus_stop) = self.bus.clone();
        staged.add_stage(Stage::from_fns(BUS_STAGE, bus_start, bus_stop).critical(true))?;

        let (master_start, master_stop) = self.master.clone();
        staged.add_stage(
            Stage::from_fns(MASTER_STAGE, master_start, master_stop)
                .depends_on(BUS_STAGE)
                .critical(true),
        )?;

        for (id, start, stop) in self.workers.clone() {
            let (start, stop) = match &self.scheduler {
                Some(scheduler) => track_worker(id, Arc::clone(scheduler), start, stop),
                None => (start, stop),
            };
            staged.add_stage(
                Stage::from_fns(worker_stage(id), start, stop)
                    .depends_on(MASTER_STAGE)
                    .critical(self.workers_critical),
            )?;
        }

        if let Some(scheduler) = &self.scheduler {
            for (id, _, _) in &self.workers {
                if scheduler.worker(*id).is_none() {
                    scheduler.add_worker(Worker::new(*id, WorkerState::Stopped));
                }
            }
        }

        staged.adopt_callbacks(&mut self.inner);
        self.inner = staged;
        debug!(workers = self.workers.len(), "agent stage graph built");
        self.built = true;
        Ok(())
    }

    /// Brings up bus, master and workers; `Ok(false)` after a rollback.
    pub async fn startup(&mut self) -> Result<bool, LifecycleError> {
        self.build()?;
        self.inner.startup().await
    }

    /// Brings the fleet down in reverse order.
    pub async fn shutdown(&mut self) -> Result<bool, LifecycleError> {
        self.inner.shutdown().await
    }

    /// Starts the fleet, waits for a termination signal, then shuts down.
    pub async fn run_until_signal(&mut self) -> Result<bool, LifecycleError> {
        self.build()?;
        self.inner.run_until_signal().await
    }

    /// Resolved start order (stage names).
    pub fn plan(&mut self) -> Result<Vec<String>, LifecycleError> {
        self.build()?;
        self.inner.plan()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    pub fn report(&self) -> &LifecycleReport {
        self.inner.report()
    }
}

impl std::fmt::Debug for AgentLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLifecycleManager")
            .field("state", &self.inner.state())
            .field("workers", &self.workers.iter().map(|w| w.0).collect::<Vec<_>>())
            .field("workers_critical", &self.workers_critical)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// Wraps worker stage functions so the scheduler sees the worker come and go.
fn track_worker(
    id: WorkerId,
    scheduler: Arc<LoadAwareScheduler>,
    start: StageFn,
    stop: StageFn,
) -> (StageFn, StageFn) {
    let on_start = Arc::clone(&scheduler);
    let tracked_start: StageFn = Arc::new(move || -> StageFuture {
        let (start, scheduler) = (Arc::clone(&start), Arc::clone(&on_start));
        Box::pin(async move {
            start().await?;
            scheduler.set_state(id, WorkerState::Running);
            Ok(())
        })
    });
    let tracked_stop: StageFn = Arc::new(move || -> StageFuture {
        let (stop, scheduler) = (Arc::clone(&stop), Arc::clone(&scheduler));
        Box::pin(async move {
            scheduler.set_state(id, WorkerState::Stopped);
            stop().await
        })
    });
    (tracked_start, tracked_stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, SchedulerConfig};
    use crate::scheduler::{ChannelHandoff, WorkItem};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn rec(
        log: &Log,
        entry: &str,
    ) -> impl Fn() -> futures::future::Ready<Result<(), StageError>> + Send + Sync + 'static {
        let (log, entry) = (Arc::clone(log), entry.to_string());
        move || {
            log.lock().push(entry.clone());
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_fleet_order() {
        let log = Log::default();
        let mut fleet = AgentLifecycleManager::new(LifecycleConfig::default())
            .bus(rec(&log, "bus+"), rec(&log, "bus-"))
            .master(rec(&log, "master+"), rec(&log, "master-"))
            .worker(2, rec(&log, "w2+"), rec(&log, "w2-"))
            .worker(1, rec(&log, "w1+"), rec(&log, "w1-"));

        assert_eq!(
            fleet.plan().unwrap(),
            vec![BUS_STAGE, MASTER_STAGE, "worker-2", "worker-1"]
        );
        assert_eq!(fleet.startup().await, Ok(true));
        assert_eq!(fleet.shutdown().await, Ok(true));
        assert_eq!(
            log.lock().clone(),
            vec!["bus+", "master+", "w2+", "w1+", "w1-", "w2-", "master-", "bus-"]
        );
    }

    #[tokio::test]
    async fn test_failed_worker_rolls_back_fleet() {
        let log = Log::default();
        let mut fleet = AgentLifecycleManager::new(LifecycleConfig::default())
            .bus(rec(&log, "bus+"), rec(&log, "bus-"))
            .master(rec(&log, "master+"), rec(&log, "master-"))
            .worker(0, rec(&log, "w0+"), rec(&log, "w0-"))
            .worker(1, || async { Err(StageError::failed("no model")) }, || async { Ok(()) });

        assert_eq!(fleet.startup().await, Ok(false));
        assert_eq!(fleet.state(), LifecycleState::RolledBack);
        assert_eq!(
            log.lock().clone(),
            vec!["bus+", "master+", "w0+", "w0-", "master-", "bus-"]
        );
    }

    #[tokio::test]
    async fn test_non_critical_workers_tolerate_failure() {
        let mut fleet = AgentLifecycleManager::new(LifecycleConfig::default())
            .workers_critical(false)
            .worker(0, || async { Err(StageError::failed("no model")) }, || async { Ok(()) })
            .worker(1, || async { Ok(()) }, || async { Ok(()) });

        assert_eq!(fleet.startup().await, Ok(true));
        assert_eq!(
            fleet.report().started,
            vec![BUS_STAGE, MASTER_STAGE, "worker-1"]
        );
    }

    #[tokio::test]
    async fn test_scheduler_follows_worker_stages() {
        let (handoff, _rx) = ChannelHandoff::new([0, 1], 8);
        let scheduler = Arc::new(LoadAwareScheduler::new(
            Arc::new(handoff),
            SchedulerConfig::default(),
        ));
        let mut fleet = AgentLifecycleManager::new(LifecycleConfig::default())
            .with_scheduler(Arc::clone(&scheduler))
            .worker(0, || async { Ok(()) }, || async { Ok(()) })
            .worker(1, || async { Ok(()) }, || async { Ok(()) });

        fleet.plan().unwrap();
        assert!(scheduler.select_worker().is_none());

        fleet.startup().await.unwrap();
        assert!(scheduler.workers().iter().all(|w| w.is_running()));
        assert!(scheduler.dispatch(WorkItem::new("t", 1)).await);

        fleet.shutdown().await.unwrap();
        assert!(scheduler.select_worker().is_none());
        assert!(!scheduler.dispatch(WorkItem::new("u", 1)).await);
    }

    #[tokio::test]
    async fn test_refused_graph_reports_same_error_each_time() {
        let ran = Arc::new(Mutex::new(0));
        let mut fleet = AgentLifecycleManager::new(LifecycleConfig::default())
            .worker(3, || async { Ok(()) }, || async { Ok(()) })
            .worker(3, || async { Ok(()) }, || async { Ok(()) });
        {
            let ran = Arc::clone(&ran);
            fleet.on_shutdown(move || async move { *ran.lock() += 1 });
        }

        let dup = LifecycleError::DuplicateStage {
            name: worker_stage(3),
        };
        assert_eq!(fleet.plan(), Err(dup.clone()));
        assert_eq!(fleet.startup().await, Err(dup));
        assert_eq!(fleet.state(), LifecycleState::Idle);

        // Callbacks registered before the failed build are still honoured.
        assert_eq!(fleet.shutdown().await, Ok(true));
        assert_eq!(*ran.lock(), 1);
    }

    #[tokio::test]
    async fn test_backend_bus_stage() {
        let backend = Arc::new(EventBackend::new(BackendConfig::default()));
        let mut fleet =
            AgentLifecycleManager::for_backend(LifecycleConfig::default(), Arc::clone(&backend));

        fleet.startup().await.unwrap();
        assert_eq!(backend.state(), crate::BackendState::Started);
        fleet.shutdown().await.unwrap();
        assert_eq!(backend.state(), crate::BackendState::Stopped);
    }
}
