//! End-to-end behaviour through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use agentbus::{
    BackendConfig, BoundedPriorityQueue, DropPolicy, Event, EventBackend, Handle, HandlerError,
    HandlerFn, HandlerRef, LifecycleConfig, LifecycleManager, Level, LoadAwareScheduler,
    PropagationMode, SchedulerConfig, Stage, StageError, SubscriptionId, WorkItem, Worker,
    WorkerId,
};

fn backend(workers: usize) -> EventBackend {
    EventBackend::new(BackendConfig {
        num_workers: workers,
        queue_capacity: 128,
        drop_policy: DropPolicy::Reject,
        drain_window: Duration::from_secs(5),
        grace: Duration::from_secs(5),
    })
}

fn counter_handler(name: &'static str, hits: Arc<AtomicU64>) -> HandlerRef {
    HandlerFn::arc(name, move |_ev: Arc<Event>| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HandlerError>(())
        }
    })
}

/// Handler that records which subscriber saw which event, in order.
fn recording(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> HandlerRef {
    HandlerFn::arc(name, move |_ev: Arc<Event>| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(name);
            Ok::<(), HandlerError>(())
        }
    })
}

#[test]
fn priority_then_arrival_order() {
    let q = BoundedPriorityQueue::new(16, DropPolicy::Reject);
    for (tag, level) in [
        ("emergency", Level::Emergency),
        ("info-1", Level::Info),
        ("warning", Level::Warning),
        ("info-2", Level::Info),
    ] {
        assert!(q.enqueue(Event::new("t").with_level(level).with_data("tag", tag)));
    }

    let order: Vec<String> = std::iter::from_fn(|| q.try_dequeue())
        .map(|ev| ev.data["tag"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(order, ["emergency", "warning", "info-1", "info-2"]);
}

#[test]
fn bounded_queue_rejects_lowest_incoming() {
    let q = BoundedPriorityQueue::new(5, DropPolicy::LowestPriority);
    let levels = [
        Level::Warning,
        Level::Error,
        Level::Warning,
        Level::Emergency,
        Level::Error,
        Level::Error,
        Level::Debug,
        Level::Emergency,
        Level::Info,
        Level::Warning,
    ];
    for level in levels {
        q.enqueue(Event::new("t").with_level(level));
        assert!(q.stats().current_size <= 5);
    }

    // Everything queued is now at least Error; a Debug event is refused outright.
    let before = q.stats();
    assert!(!q.enqueue(Event::new("t").with_level(Level::Debug)));
    let after = q.stats();
    assert_eq!(after.current_size, 5);
    assert_eq!(after.dropped_count, before.dropped_count + 1);
    assert_eq!(after.enqueued_count, before.enqueued_count);
}

#[tokio::test]
async fn broadcast_reaches_each_subscriber_once() {
    let bus = backend(3);
    let hits: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    for h in &hits {
        bus.subscribe("t", counter_handler("b", Arc::clone(h)), PropagationMode::Broadcast);
    }

    bus.start().await.unwrap();
    assert!(bus.publish(Event::new("t")));
    bus.stop().await.unwrap();

    for h in &hits {
        assert_eq!(h.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn competing_delivers_each_event_once_and_balanced() {
    let bus = backend(1);
    let hits: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    for h in &hits {
        bus.subscribe("t", counter_handler("c", Arc::clone(h)), PropagationMode::Competing);
    }

    bus.start().await.unwrap();
    for _ in 0..3 {
        assert!(bus.publish(Event::new("t")));
    }
    bus.stop().await.unwrap();

    let counts: Vec<u64> = hits.iter().map(|h| h.load(Ordering::SeqCst)).collect();
    assert_eq!(counts.iter().sum::<u64>(), 3);
    assert!(counts.iter().max().unwrap() - counts.iter().min().unwrap() <= 1);
}

#[tokio::test]
async fn round_robin_cycles_in_registration_order() {
    // One worker keeps dequeue order equal to delivery order.
    let bus = backend(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["r1", "r2", "r3"] {
        bus.subscribe("t", recording(name, Arc::clone(&log)), PropagationMode::RoundRobin);
    }

    for _ in 0..6 {
        assert!(bus.publish(Event::new("t")));
    }
    bus.start().await.unwrap();
    bus.stop().await.unwrap();

    assert_eq!(*log.lock(), ["r1", "r2", "r3", "r1", "r2", "r3"]);
}

#[tokio::test]
async fn failing_handler_does_not_affect_others() {
    let bus = backend(2);
    let ok_hits = Arc::new(AtomicU64::new(0));
    bus.subscribe(
        "t",
        HandlerFn::arc("always-fails", |_ev: Arc<Event>| async {
            Err::<(), _>(HandlerError::failed("downstream unavailable"))
        }),
        PropagationMode::Broadcast,
    );
    let ok_id: SubscriptionId =
        bus.subscribe("t", counter_handler("ok", Arc::clone(&ok_hits)), PropagationMode::Broadcast);

    bus.start().await.unwrap();
    assert!(bus.publish(Event::new("t")));
    // Wait for the event to be handled before reading per-subscription counters.
    for _ in 0..100 {
        if bus.get_stats().processed_count == 1 && ok_hits.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(bus.dispatcher().delivery_counts("t")[&ok_id], 1);
    bus.stop().await.unwrap();

    let stats = bus.get_stats();
    assert_eq!(ok_hits.load(Ordering::SeqCst), 1);
    assert!(stats.error_count >= 1);
}

#[tokio::test]
async fn scheduler_picks_least_loaded_worker() {
    let assigned: Arc<Mutex<Vec<WorkerId>>> = Arc::default();

    struct Record(Arc<Mutex<Vec<WorkerId>>>);

    #[async_trait::async_trait]
    impl agentbus::Handoff for Record {
        async fn hand_off(&self, worker: WorkerId, _item: WorkItem) -> bool {
            self.0.lock().push(worker);
            true
        }
    }

    let scheduler = LoadAwareScheduler::with_workers(
        Arc::new(Record(Arc::clone(&assigned))),
        SchedulerConfig::default(),
        [
            Worker::running(1).with_pending(5),
            Worker::running(2).with_pending(2),
            Worker::running(3).with_pending(8),
        ],
    );

    let chosen = scheduler.select_worker().unwrap();
    assert_eq!(chosen.pending_count, 2);
    assert!(scheduler.dispatch(WorkItem::new("job", "payload")).await);
    assert_eq!(scheduler.worker(chosen.id).unwrap().pending_count, 3);
    assert_eq!(*assigned.lock(), [chosen.id]);
}

fn logged_stage(log: &Arc<Mutex<Vec<String>>>, name: &str, fails: bool) -> Stage {
    let (start_log, stop_log) = (Arc::clone(log), Arc::clone(log));
    let (start_name, stop_name) = (name.to_string(), name.to_string());
    Stage::new(
        name,
        move || {
            start_log.lock().push(format!("start {start_name}"));
            let outcome = if fails {
                Err(StageError::failed("boom"))
            } else {
                Ok(())
            };
            async move { outcome }
        },
        move || {
            stop_log.lock().push(format!("stop {stop_name}"));
            async { Ok(()) }
        },
    )
}

#[tokio::test]
async fn lifecycle_starts_in_order_and_stops_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut lm = LifecycleManager::new(LifecycleConfig::default());
    lm.add_stage(logged_stage(&log, "A", false)).unwrap();
    lm.add_stage(logged_stage(&log, "B", false).depends_on("A")).unwrap();
    lm.add_stage(logged_stage(&log, "C", false).depends_on("B")).unwrap();

    assert!(lm.startup().await.unwrap());
    assert!(lm.shutdown().await.unwrap());
    assert_eq!(
        *log.lock(),
        ["start A", "start B", "start C", "stop C", "stop B", "stop A"]
    );
}

#[tokio::test]
async fn critical_failure_rolls_back_started_stages() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut lm = LifecycleManager::new(LifecycleConfig::default());
    lm.add_stage(logged_stage(&log, "A", false)).unwrap();
    lm.add_stage(logged_stage(&log, "B", true).critical(true)).unwrap();
    lm.add_stage(logged_stage(&log, "C", false)).unwrap();

    assert!(!lm.startup().await.unwrap());
    let log = log.lock();
    assert_eq!(*log, ["start A", "start B", "stop A"]);
    assert_eq!(log.iter().filter(|e| *e == "stop A").count(), 1);
}

#[tokio::test]
async fn stats_are_stable_without_activity() {
    let bus = backend(2);
    let h = Arc::new(AtomicU64::new(0));
    bus.subscribe("t", counter_handler("h", Arc::clone(&h)), PropagationMode::Competing);
    bus.start().await.unwrap();
    for _ in 0..4 {
        bus.publish(Event::new("t"));
    }
    bus.publish(Event::new("unrouted"));
    while bus.get_stats().processed_count < 5 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let first = bus.get_stats();
    let second = bus.get_stats();
    assert_eq!(first, second);
    assert_eq!(first.published_count, 5);
    bus.stop().await.unwrap();
}

#[tokio::test]
async fn handlers_can_be_plain_trait_objects() {
    struct Audit(Arc<AtomicU64>);

    #[async_trait::async_trait]
    impl Handle for Audit {
        async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
            if event.level >= Level::Error {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "audit"
        }
    }

    let seen = Arc::new(AtomicU64::new(0));
    let bus = backend(1);
    bus.subscribe_with(
        "agent.status",
        Arc::new(Audit(Arc::clone(&seen))),
        PropagationMode::Broadcast,
        Some(Arc::new(|ev: &Event| &*ev.source == "master")),
    );

    bus.publish(Event::new("agent.status").with_source("master").with_level(Level::Error));
    bus.publish(Event::new("agent.status").with_source("worker-1").with_level(Level::Error));
    bus.publish(Event::new("agent.status").with_source("master"));
    bus.start().await.unwrap();
    bus.stop().await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_target_modes_stay_exact_under_concurrent_workers() {
    // Room for every event so admission never depends on consumer speed.
    let bus = EventBackend::new(BackendConfig {
        num_workers: 4,
        queue_capacity: 512,
        drop_policy: DropPolicy::Reject,
        drain_window: Duration::from_secs(5),
        grace: Duration::from_secs(5),
    });
    let competing: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    let rotating: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    for h in &competing {
        bus.subscribe("jobs", counter_handler("c", Arc::clone(h)), PropagationMode::Competing);
    }
    for h in &rotating {
        bus.subscribe("ticks", counter_handler("r", Arc::clone(h)), PropagationMode::RoundRobin);
    }

    bus.start().await.unwrap();
    for i in 0..300 {
        let topic = if i % 2 == 0 { "jobs" } else { "ticks" };
        assert!(bus.publish(Event::new(topic)));
        if i % 16 == 0 {
            tokio::task::yield_now().await;
        }
    }
    bus.stop().await.unwrap();

    for group in [&competing, &rotating] {
        let counts: Vec<u64> = group.iter().map(|h| h.load(Ordering::SeqCst)).collect();
        assert_eq!(counts.iter().sum::<u64>(), 150, "exactly once: {counts:?}");
        assert_eq!(counts, [50, 50, 50]);
    }
    let stats = bus.get_stats();
    assert_eq!(stats.processed_count, 300);
    assert_eq!(stats.error_count, 0);
}
