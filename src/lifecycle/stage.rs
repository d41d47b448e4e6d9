//! # Lifecycle stages and the guarded stage runner.
//!
//! A [`Stage`] pairs a `start` and a `stop` function with its dependencies,
//! criticality and an optional timeout. Both functions are no-argument async
//! closures producing a fresh future per call, and must tolerate being
//! called during rollback.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use agentbus::{Stage, StageError};
//!
//! let db = Stage::new(
//!     "database",
//!     || async { Ok::<_, StageError>(()) },
//!     || async { Ok::<_, StageError>(()) },
//! )
//! .critical(true)
//! .with_timeout(Duration::from_secs(5));
//!
//! let api = Stage::new("api", || async { Ok(()) }, || async { Ok(()) }).depends_on("database");
//!
//! assert_eq!(db.name(), "database");
//! assert_eq!(api.dependencies(), ["database"]);
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::StageError;

/// Future returned by a stage function.
pub type StageFuture = BoxFuture<'static, Result<(), StageError>>;

/// Shared stage function: called once per start/stop attempt.
pub type StageFn = Arc<dyn Fn() -> StageFuture + Send + Sync>;

/// Wraps a closure returning a future into a [`StageFn`].
pub fn stage_fn<F, Fut>(f: F) -> StageFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StageError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// One node of the startup graph.
#[derive(Clone)]
pub struct Stage {
    name: String,
    start: StageFn,
    stop: StageFn,
    dependencies: Vec<String>,
    critical: bool,
    timeout: Option<Duration>,
}

impl Stage {
    /// Creates a non-critical stage without dependencies or timeout.
    pub fn new<S, SFut, T, TFut>(name: impl Into<String>, start: S, stop: T) -> Self
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), StageError>> + Send + 'static,
        T: Fn() -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        Self::from_fns(name, stage_fn(start), stage_fn(stop))
    }

    /// Creates a stage from already-boxed functions.
    pub fn from_fns(name: impl Into<String>, start: StageFn, stop: StageFn) -> Self {
        Self {
            name: name.into(),
            start,
            stop,
            dependencies: Vec::new(),
            critical: false,
            timeout: None,
        }
    }

    /// Adds a stage that must have started before this one.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Marks the stage critical: its startup failure rolls back the whole startup.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Bounds each start (and, depending on config, stop) attempt. Zero means no timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|d| !d.is_zero());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn start_fn(&self) -> &StageFn {
        &self.start
    }

    pub(crate) fn stop_fn(&self) -> &StageFn {
        &self.stop
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs one stage function with an optional timeout.
///
/// A panic inside the function becomes [`StageError::Panicked`]; an elapsed
/// timeout drops the in-flight future and becomes [`StageError::Timeout`].
pub(crate) async fn run_guarded(f: &StageFn, timeout: Option<Duration>) -> Result<(), StageError> {
    let f = Arc::clone(f);
    // Calling `f` inside the future routes synchronous panics through `catch_unwind` as well.
    let guarded = std::panic::AssertUnwindSafe(async move { f().await }).catch_unwind();

    let res = match timeout.filter(|d| *d > Duration::ZERO) {
        Some(dur) => match tokio::time::timeout(dur, guarded).await {
            Ok(r) => r,
            Err(_elapsed) => return Err(StageError::Timeout { timeout: dur }),
        },
        None => guarded.await,
    };

    res.unwrap_or_else(|panic_err| {
        let any = &*panic_err;
        let info = if let Some(msg) = any.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = any.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Err(StageError::Panicked { info })
    })
}
