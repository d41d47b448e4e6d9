//! # Events routed through the backend.
//!
//! An [`Event`] is addressed by its `kind`, which is matched exactly against
//! subscription topics. It carries a free-form `data` map, the name of the
//! producing component, a [`Level`] and a wall-clock timestamp.
//!
//! Each event receives a unique `id` (UUID v4) at creation. Once published the
//! event is owned by the queue, then shared read-only (`Arc<Event>`) with every
//! handler that receives it.
//!
//! ## Example
//! ```rust
//! use agentbus::{Event, Level};
//!
//! let ev = Event::new("tool.completed")
//!     .with_source("executor")
//!     .with_level(Level::Warning)
//!     .with_data("tool", "read")
//!     .with_data("elapsed_ms", 150);
//!
//! assert_eq!(&*ev.kind, "tool.completed");
//! assert_eq!(ev.level.priority(), Level::Warning.priority());
//! assert_eq!(ev.data["elapsed_ms"], 150);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::level::Level;

/// Message published into the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier assigned at creation.
    pub id: String,
    /// Event type; subscriptions match it exactly as their topic.
    pub kind: Arc<str>,
    /// Arbitrary payload.
    pub data: HashMap<String, Value>,
    /// Producing component.
    pub source: Arc<str>,
    /// Severity, also the queue priority.
    pub level: Level,
    /// Wall-clock creation time.
    pub timestamp: SystemTime,
}

impl Event {
    /// Creates an `Info` event of the given kind with an empty payload.
    pub fn new(kind: impl Into<Arc<str>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            data: HashMap::new(),
            source: Arc::from(""),
            level: Level::default(),
            timestamp: SystemTime::now(),
        }
    }

    /// Attaches a payload entry.
    #[inline]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Attaches the producing component name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the severity (and therefore the queue priority).
    #[inline]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Queue priority of this event.
    #[inline]
    pub fn priority(&self) -> u8 {
        self.level.priority()
    }

    /// Creation time as fractional seconds since the Unix epoch.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}
