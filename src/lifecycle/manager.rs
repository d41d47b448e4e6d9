//! # LifecycleManager: ordered startup, rollback and best-effort shutdown.
//!
//! ## State machine
//! ```text
//! Idle ──startup()──► Starting ──all critical stages ok──► Running ──shutdown()──► Stopping ──► ShutdownComplete
//!                         │
//!                         └── critical stage failed ──► rollback (stop started stages, reverse order) ──► RolledBack
//! ```
//!
//! ## Startup
//! ```text
//! for stage in plan (dependencies first, then registration order):
//!   ├─ a dependency failed or was skipped → skip the stage
//!   ├─ start_fn (timeout, panic-guarded)
//!   │     ├─ Ok  → started
//!   │     └─ Err → critical?   yes → rollback, return false
//!   │                          no  → record, continue
//! ```
//!
//! ## Rules
//! - The plan is validated (unknown dependencies, cycles) before any stage runs.
//! - A critical stage that is skipped because a dependency failed counts as a critical failure.
//! - Shutdown stops every started stage even if some `stop_fn`s fail, then runs each
//!   shutdown callback once.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::plan;
use super::signal::wait_for_shutdown_signal;
use super::stage::{Stage, run_guarded};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, StageError};

type ShutdownCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Lifecycle manager state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
    ShutdownComplete,
    RolledBack,
}

impl LifecycleState {
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::ShutdownComplete => "shutdown_complete",
            LifecycleState::RolledBack => "rolled_back",
        }
    }
}

/// Outcome of the last startup/shutdown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Stages whose `start_fn` succeeded, in start order.
    pub started: Vec<String>,
    /// Stages whose `start_fn` failed.
    pub failed: Vec<(String, StageError)>,
    /// Stages not attempted because a dependency failed or was skipped.
    pub skipped: Vec<String>,
    /// Stages whose `stop_fn` failed during rollback or shutdown.
    pub stop_failures: Vec<(String, StageError)>,
    /// Whether startup ended with a rollback.
    pub rolled_back: bool,
}

/// Ordered multi-stage startup and shutdown.
pub struct LifecycleManager {
    cfg: LifecycleConfig,
    stages: Vec<Stage>,
    state: LifecycleState,
    /// Indices of successfully started stages, in start order.
    started: Vec<usize>,
    callbacks: Vec<ShutdownCallback>,
    report: LifecycleReport,
}

impl LifecycleManager {
    pub fn new(cfg: LifecycleConfig) -> Self {
        Self {
            cfg,
            stages: Vec::new(),
            state: LifecycleState::Idle,
            started: Vec::new(),
            callbacks: Vec::new(),
            report: LifecycleReport::default(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn report(&self) -> &LifecycleReport {
        &self.report
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.cfg
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Registers a stage.
    ///
    /// Dependencies may name stages registered later; they are resolved by
    /// [`plan`](Self::plan). A registration that closes a cycle is refused.
    pub fn add_stage(&mut self, stage: Stage) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Idle {
            return Err(self.invalid("add a stage"));
        }
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            return Err(LifecycleError::DuplicateStage {
                name: stage.name().to_string(),
            });
        }

        self.stages.push(stage);
        if let Some(cycle) = plan::find_cycle(&self.stages) {
            self.stages.pop();
            return Err(LifecycleError::CycleDetected { cycle });
        }
        if let Some(s) = self.stages.last() {
            debug!(
                stage = s.name(),
                dependencies = ?s.dependencies(),
                critical = s.is_critical(),
                "stage registered"
            );
        }
        Ok(())
    }

    /// Registers a callback run once during [`shutdown`](Self::shutdown), after every `stop_fn`.
    pub fn on_shutdown<F, Fut>(&mut self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.push(Box::new(move || callback().boxed()));
    }

    /// Resolved start order (stage names).
    pub fn plan(&self) -> Result<Vec<String>, LifecycleError> {
        let order = plan::start_order(&self.stages)?;
        Ok(order
            .into_iter()
            .map(|i| self.stages[i].name().to_string())
            .collect())
    }

    fn invalid(&self, operation: &'static str) -> LifecycleError {
        LifecycleError::InvalidState {
            operation,
            state: self.state.as_label(),
        }
    }

    fn timeout_of(&self, stage: &Stage) -> Option<Duration> {
        stage.timeout().or_else(|| self.cfg.default_timeout())
    }

    /// Starts every stage in plan order.
    ///
    /// Returns `Ok(true)` when no critical stage failed, `Ok(false)` after a
    /// rollback. Configuration errors are returned before any stage runs.
    pub async fn startup(&mut self) -> Result<bool, LifecycleError> {
        if self.state != LifecycleState::Idle {
            return Err(self.invalid("start up"));
        }
        let order = plan::start_order(&self.stages)?;

        self.state = LifecycleState::Starting;
        self.report = LifecycleReport::default();
        info!(stages = order.len(), "lifecycle startup");

        let mut unavailable: HashSet<usize> = HashSet::new();
        for idx in order {
            let stage = self.stages[idx].clone();
            let blocked = stage
                .dependencies()
                .iter()
                .find(|dep| {
                    self.stages
                        .iter()
                        .position(|s| s.name() == dep.as_str())
                        .is_some_and(|d| unavailable.contains(&d))
                })
                .cloned();

            if let Some(dep) = blocked {
                unavailable.insert(idx);
                self.report.skipped.push(stage.name().to_string());
                if stage.is_critical() {
                    error!(stage = stage.name(), dependency = %dep, "critical stage skipped; rolling back");
                    self.rollback().await;
                    return Ok(false);
                }
                warn!(stage = stage.name(), dependency = %dep, "stage skipped: dependency unavailable");
                continue;
            }

            debug!(stage = stage.name(), "starting stage");
            match run_guarded(stage.start_fn(), self.timeout_of(&stage)).await {
                Ok(()) => {
                    info!(stage = stage.name(), "stage started");
                    self.started.push(idx);
                    self.report.started.push(stage.name().to_string());
                }
                Err(err) => {
                    unavailable.insert(idx);
                    self.report
                        .failed
                        .push((stage.name().to_string(), err.clone()));
                    if stage.is_critical() {
                        error!(stage = stage.name(), reason = err.as_label(), error = %err, "critical stage failed; rolling back");
                        self.rollback().await;
                        return Ok(false);
                    }
                    warn!(stage = stage.name(), reason = err.as_label(), error = %err, "stage failed; skipping");
                }
            }
        }

        self.state = LifecycleState::Running;
        info!(
            started = self.report.started.len(),
            failed = self.report.failed.len(),
            skipped = self.report.skipped.len(),
            "lifecycle running"
        );
        Ok(true)
    }

    /// Stops started stages in reverse start order, regardless of config.
    async fn rollback(&mut self) {
        let started = std::mem::take(&mut self.started);
        for idx in started.into_iter().rev() {
            self.stop_stage(idx).await;
        }
        self.report.rolled_back = true;
        self.state = LifecycleState::RolledBack;
        warn!(failures = self.report.stop_failures.len(), "lifecycle rolled back");
    }

    async fn stop_stage(&mut self, idx: usize) {
        let stage = self.stages[idx].clone();
        let timeout = if self.cfg.timeout_applies_to_stop {
            self.timeout_of(&stage)
        } else {
            None
        };
        debug!(stage = stage.name(), "stopping stage");
        if let Err(err) = run_guarded(stage.stop_fn(), timeout).await {
            warn!(stage = stage.name(), reason = err.as_label(), error = %err, "stage stop failed");
            self.report
                .stop_failures
                .push((stage.name().to_string(), err));
        }
    }

    /// Moves the shutdown callbacks registered on `other` into `self`.
    pub(crate) fn adopt_callbacks(&mut self, other: &mut LifecycleManager) {
        self.callbacks.append(&mut other.callbacks);
    }

    /// Stops every started stage, then runs the shutdown callbacks.
    ///
    /// Stop order is the reverse of start order unless `stop_order_reversed`
    /// is off. Returns `Ok(true)` if every `stop_fn` succeeded.
    pub async fn shutdown(&mut self) -> Result<bool, LifecycleError> {
        match self.state {
            LifecycleState::Idle | LifecycleState::Running | LifecycleState::RolledBack => {}
            _ => return Err(self.invalid("shut down")),
        }
        self.state = LifecycleState::Stopping;
        let failures_before = self.report.stop_failures.len();
        info!(stages = self.started.len(), "lifecycle shutdown");

        let mut started = std::mem::take(&mut self.started);
        if self.cfg.stop_order_reversed {
            started.reverse();
        }
        for idx in started {
            self.stop_stage(idx).await;
        }

        for (i, callback) in std::mem::take(&mut self.callbacks).into_iter().enumerate() {
            let fut = std::panic::AssertUnwindSafe(async move { callback().await }).catch_unwind();
            if fut.await.is_err() {
                warn!(callback = i, "shutdown callback panicked");
            }
        }

        self.state = LifecycleState::ShutdownComplete;
        let clean = self.report.stop_failures.len() == failures_before;
        info!(clean, "lifecycle shutdown complete");
        Ok(clean)
    }

    /// Starts up, waits for a termination signal, then shuts down.
    ///
    /// Returns `Ok(false)` without waiting if startup rolled back.
    pub async fn run_until_signal(&mut self) -> Result<bool, LifecycleError> {
        if !self.startup().await? {
            return Ok(false);
        }
        match wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "shutdown signal received"),
            Err(err) => error!(error = %err, "signal listener failed; shutting down"),
        }
        self.shutdown().await
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state", &self.state)
            .field("stages", &self.stages)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
