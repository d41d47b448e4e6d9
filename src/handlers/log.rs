//! # LogWriter: event logger
//!
//! A minimal handler that logs incoming [`Event`]s through `tracing`, at the
//! tracing level matching the event's [`Level`].
//!
//! ## Example output
//! ```text
//! INFO  agentbus::handlers: [agent.started] source="master" id=3f2c... data={}
//! WARN  agentbus::handlers: [tool.failed] source="executor" id=9a01... data={"tool":"read"}
//! ERROR agentbus::handlers: [system.alert] source="monitor" id=c7d4... data={}
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::dispatch::Handle;
use crate::error::HandlerError;
use crate::events::{Event, Level};

/// Event logging handler.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handle for LogWriter {
    async fn handle(&self, e: Arc<Event>) -> Result<(), HandlerError> {
        let data = serde_json::to_string(&e.data).map_err(HandlerError::failed)?;
        match e.level {
            Level::Debug => {
                debug!(target: "agentbus::handlers", "[{}] source={:?} id={} data={}", e.kind, e.source, e.id, data);
            }
            Level::Info => {
                info!(target: "agentbus::handlers", "[{}] source={:?} id={} data={}", e.kind, e.source, e.id, data);
            }
            Level::Warning => {
                warn!(target: "agentbus::handlers", "[{}] source={:?} id={} data={}", e.kind, e.source, e.id, data);
            }
            Level::Error | Level::Emergency => {
                error!(
                    target: "agentbus::handlers",
                    emergency = e.level == Level::Emergency,
                    "[{}] source={:?} id={} data={}",
                    e.kind, e.source, e.id, data
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "LogWriter"
    }
}
