//! # Example: Agent Fleet
//!
//! Bus, master and three workers brought up in order. The scheduler follows
//! the worker stages, so tasks are only handed to workers that are running.
//! Each worker drains its own channel and reports completions back.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use agentbus::{
    AgentLifecycleManager, BackendConfig, ChannelHandoff, Completion, EventBackend,
    LifecycleConfig, LoadAwareScheduler, SchedulerConfig, StageError, TaskOutcome, WorkItem,
    WorkerId,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let worker_ids: [WorkerId; 3] = [0, 1, 2];
    let (handoff, inboxes) = ChannelHandoff::new(worker_ids, 16);
    let scheduler = Arc::new(LoadAwareScheduler::new(
        Arc::new(handoff),
        SchedulerConfig::default(),
    ));
    let backend = Arc::new(EventBackend::new(BackendConfig::default()));

    let mut fleet = AgentLifecycleManager::for_backend(LifecycleConfig::default(), backend)
        .with_scheduler(Arc::clone(&scheduler))
        .master(
            || async {
                println!("[master] up");
                Ok::<(), StageError>(())
            },
            || async {
                println!("[master] down");
                Ok::<(), StageError>(())
            },
        );
    for id in worker_ids {
        fleet = fleet.worker(
            id,
            move || async move {
                println!("[worker-{id}] up");
                Ok::<(), StageError>(())
            },
            move || async move {
                println!("[worker-{id}] down");
                Ok::<(), StageError>(())
            },
        );
    }
    fleet.on_shutdown(|| async { println!("[fleet] shutdown callbacks done") });

    println!("[fleet] plan: {:?}", fleet.plan()?);
    if !fleet.startup().await? {
        anyhow::bail!("fleet rolled back: {:?}", fleet.report().failed);
    }

    for n in 0..7 {
        let item = WorkItem::new(format!("task-{n}"), serde_json::json!({ "step": n }));
        println!("[coordinator] dispatch task-{n}: {}", scheduler.dispatch(item).await);
    }
    for w in scheduler.workers() {
        println!("[coordinator] worker-{} pending={}", w.id, w.pending_count);
    }

    drain(&scheduler, inboxes).await;
    println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);

    fleet.shutdown().await?;
    Ok(())
}

/// Completes everything queued in the inboxes; the first attempt of `task-3` asks for a retry.
async fn drain(
    scheduler: &LoadAwareScheduler,
    mut inboxes: HashMap<WorkerId, mpsc::Receiver<WorkItem>>,
) {
    loop {
        let mut progressed = false;
        for (id, rx) in inboxes.iter_mut() {
            while let Ok(item) = rx.try_recv() {
                progressed = true;
                let outcome = if item.id == "task-3" && item.attempts == 1 {
                    TaskOutcome::Retry
                } else {
                    TaskOutcome::Done
                };
                match scheduler.complete(*id, &item.id, outcome).await {
                    Completion::Retried { worker, attempts } => {
                        println!("[worker-{id}] {} retried on worker-{worker} (attempt {attempts})", item.id)
                    }
                    other => println!("[worker-{id}] {} -> {other:?}", item.id),
                }
            }
        }
        if !progressed {
            break;
        }
    }
}
