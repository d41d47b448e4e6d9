//! Error types used by the event backend, the lifecycle manager and handlers.
//!
//! This module defines four enums:
//!
//! - [`BackendError`]: misuse of the [`EventBackend`](crate::EventBackend) state machine,
//!   or a stop sequence that exceeded its grace period.
//! - [`HandlerError`]: failures raised by subscriber handlers (caught at the dispatch boundary).
//! - [`StageError`]: failures raised by lifecycle stage functions (including timeouts).
//! - [`LifecycleError`]: configuration errors of the stage graph and invalid transitions.
//!
//! Admission failures (full queue) and dispatch unavailability (no running worker)
//! are **not** errors: they surface as `false` from `publish`/`dispatch`.
//!
//! All types provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the event backend.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// `start()` was called on a backend that is already running.
    #[error("backend already started")]
    AlreadyStarted,

    /// The backend was stopped; a stopped backend cannot be restarted.
    #[error("backend already stopped")]
    AlreadyStopped,

    /// `stop()` was called before `start()`.
    #[error("backend not started")]
    NotStarted,

    /// Workers did not exit within the grace period and were forced to stop.
    #[error("shutdown grace {grace:?} exceeded; {stuck} worker(s) forced to exit")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Number of workers still running when the grace period elapsed.
        stuck: usize,
    },
}

impl BackendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use agentbus::BackendError;
    ///
    /// assert_eq!(BackendError::AlreadyStopped.as_label(), "backend_already_stopped");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BackendError::AlreadyStarted => "backend_already_started",
            BackendError::AlreadyStopped => "backend_already_stopped",
            BackendError::NotStarted => "backend_not_started",
            BackendError::GraceExceeded { .. } => "backend_grace_exceeded",
        }
    }
}

/// # Errors produced by subscriber handlers.
///
/// Handlers return [`HandlerError::Failed`]; the dispatcher converts a panic
/// into [`HandlerError::Panicked`]. Neither is ever returned to the publisher.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler reported a failure.
    #[error("handler failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// Handler panicked while processing an event.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl HandlerError {
    /// Builds a [`HandlerError::Failed`] from any displayable error.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        HandlerError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Failed { .. } => "handler_failed",
            HandlerError::Panicked { .. } => "handler_panicked",
        }
    }
}

impl From<String> for HandlerError {
    fn from(error: String) -> Self {
        HandlerError::Failed { error }
    }
}

impl From<&str> for HandlerError {
    fn from(error: &str) -> Self {
        HandlerError::Failed {
            error: error.to_string(),
        }
    }
}

/// # Errors produced by lifecycle stage functions.
///
/// A stage function returns [`StageError::Failed`]; the stage runner produces
/// [`StageError::Timeout`] and [`StageError::Panicked`]. All three are treated
/// the same way by the lifecycle manager: the stage failed.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Stage function reported a failure.
    #[error("stage failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// Stage function exceeded its timeout.
    #[error("stage timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Stage function panicked.
    #[error("stage panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl StageError {
    /// Builds a [`StageError::Failed`] from any displayable error.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        StageError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use agentbus::StageError;
    /// use std::time::Duration;
    ///
    /// let err = StageError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "stage_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StageError::Failed { .. } => "stage_failed",
            StageError::Timeout { .. } => "stage_timeout",
            StageError::Panicked { .. } => "stage_panicked",
        }
    }
}

impl From<String> for StageError {
    fn from(error: String) -> Self {
        StageError::Failed { error }
    }
}

impl From<&str> for StageError {
    fn from(error: &str) -> Self {
        StageError::Failed {
            error: error.to_string(),
        }
    }
}

/// # Configuration and state errors of the lifecycle manager.
///
/// These are programming/configuration errors: they are raised before any
/// stage function runs and are not meant to be retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// A stage with the same name is already registered.
    #[error("stage '{name}' is already registered")]
    DuplicateStage {
        /// Name of the duplicated stage.
        name: String,
    },

    /// A stage depends on a stage that was never registered.
    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        /// The dependent stage.
        stage: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected {
        /// Stage names forming the cycle; the first name is repeated at the end.
        cycle: Vec<String>,
    },

    /// Operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// Current state label.
        state: &'static str,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::DuplicateStage { .. } => "lifecycle_duplicate_stage",
            LifecycleError::UnknownDependency { .. } => "lifecycle_unknown_dependency",
            LifecycleError::CycleDetected { .. } => "lifecycle_cycle_detected",
            LifecycleError::InvalidState { .. } => "lifecycle_invalid_state",
        }
    }
}
