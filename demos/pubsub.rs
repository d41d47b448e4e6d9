//! # Example: Publish / Subscribe
//!
//! One topic with all three propagation modes, a filtered subscriber and the
//! built-in `LogWriter`. Run with `RUST_LOG=debug` to see dispatch traces.

use std::sync::Arc;
use std::time::Duration;

use agentbus::{
    BackendConfig, DropPolicy, Event, EventBackend, HandlerError, Level, LogWriter,
    PropagationMode,
};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let backend = EventBackend::new(BackendConfig {
        num_workers: 2,
        queue_capacity: 64,
        drop_policy: DropPolicy::LowestPriority,
        drain_window: Duration::from_secs(2),
        grace: Duration::from_secs(2),
    });

    backend.subscribe("tool.completed", Arc::new(LogWriter::new()), PropagationMode::Broadcast);
    for name in ["indexer-a", "indexer-b"] {
        backend.subscribe_fn("tool.completed", PropagationMode::Competing, move |ev: Arc<Event>| async move {
            println!("[{name}] indexing {}", ev.data["tool"]);
            Ok::<(), HandlerError>(())
        });
    }
    for name in ["auditor-1", "auditor-2", "auditor-3"] {
        backend.subscribe_fn("tool.completed", PropagationMode::RoundRobin, move |ev: Arc<Event>| async move {
            println!("[{name}] audit {}", ev.id);
            Ok::<(), HandlerError>(())
        });
    }
    backend.subscribe_with(
        "tool.completed",
        agentbus::HandlerFn::arc("alerts", |ev: Arc<Event>| async move {
            println!("[alerts] {} reported {}", ev.source, ev.level);
            Ok::<(), HandlerError>(())
        }),
        PropagationMode::Broadcast,
        Some(Arc::new(|ev: &Event| ev.level >= Level::Error)),
    );

    backend.start().await?;
    for (i, tool) in ["read_file", "grep", "write_file", "run_tests", "git_diff"].iter().enumerate() {
        let level = if *tool == "run_tests" { Level::Error } else { Level::Info };
        let admitted = backend.publish(
            Event::new("tool.completed")
                .with_source(format!("executor-{i}"))
                .with_level(level)
                .with_data("tool", *tool),
        );
        println!("[main] published {tool}: admitted={admitted}");
    }
    backend.stop().await?;

    println!("{}", serde_json::to_string_pretty(&backend.get_stats())?);
    Ok(())
}
