use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use tokio::sync::Notify;
use tokio_stream::StreamExt;
use tokio_test::{assert_err, assert_ok};

use dog_tasks::{Task, TaskError, TaskEvent, TaskHandle, TaskId, TaskManager, TaskState};

/// Test factory: a task that records when it starts and finishes when its gate opens
fn gated_task(name: &str, gate: Arc<Notify>, started: Arc<Mutex<Vec<String>>>) -> Task {
    let label = name.to_string();
    Task::new(name.to_string(), move |_ctx| async move {
        started.lock().push(label);
        gate.notified().await;
        Ok::<(), TaskError>(())
    })
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timeout waiting for {}", what));
}

/// Three slots, five submissions: three run, two wait, and they start in order
#[tokio::test]
async fn test_five_tasks_three_slots() {
    let manager = TaskManager::with_max_workers(3);
    let started = Arc::new(Mutex::new(Vec::new()));
    let gates: Vec<Arc<Notify>> = (0..5).map(|_| Arc::new(Notify::new())).collect();

    let handles: Vec<TaskHandle> = (0..5)
        .map(|i| {
            manager
                .submit(gated_task(&format!("t{}", i), gates[i].clone(), started.clone()))
                .unwrap()
        })
        .collect();

    // Admission is decided synchronously by submit
    assert_eq!(manager.running_count(), 3);
    assert_eq!(manager.queued_count(), 2);
    for handle in &handles[..3] {
        assert!(handle.state().is_running());
    }
    for handle in &handles[3..] {
        assert!(handle.state().is_queued());
    }

    // Free the second slot first: the oldest queued task (t3) takes it
    gates[1].notify_one();
    assert!(matches!(handles[1].wait().await, TaskState::Completed { .. }));
    eventually("t3 to start", || handles[3].state().is_running()).await;
    assert!(handles[4].state().is_queued());

    gates[0].notify_one();
    eventually("t4 to start", || handles[4].state().is_running()).await;
    assert_eq!(manager.queued_count(), 0);

    for gate in &gates {
        gate.notify_one();
    }
    for handle in &handles {
        assert!(matches!(handle.wait().await, TaskState::Completed { .. }));
    }

    let order = started.lock().clone();
    assert_eq!(order[3..], ["t3".to_string(), "t4".to_string()]);
    assert_eq!(manager.running_count(), 0);
    assert_eq!(manager.stats().completed, 5);
}

/// Sleeping bodies: every task eventually completes under the bound
#[tokio::test]
async fn test_sleeping_bodies_complete_under_bound() {
    let manager = TaskManager::with_max_workers(3);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<TaskHandle> = (0..5)
        .map(|i| {
            let current = current.clone();
            let peak = peak.clone();
            manager
                .submit(Task::new(format!("sleep-{}", i), move |_ctx| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), TaskError>(())
                }))
                .unwrap()
        })
        .collect();

    for handle in &handles {
        assert!(matches!(handle.wait().await, TaskState::Completed { .. }));
    }
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

/// Identifiers stay unique and dense under concurrent submission
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_get_unique_ids() {
    let manager = TaskManager::with_max_workers(4);

    let mut producers = Vec::new();
    for producer in 0..8 {
        let manager = manager.clone();
        producers.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..25 {
                let handle = manager
                    .submit(Task::new(format!("p{}-{}", producer, i), |_ctx| async {
                        Ok::<(), TaskError>(())
                    }))
                    .unwrap();
                ids.push(handle.id());
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for producer in producers {
        let ids = producer.await.unwrap();
        // Each producer observes strictly increasing identifiers
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        all.extend(ids);
    }

    all.sort();
    let expected: Vec<TaskId> = (1..=200).map(TaskId).collect();
    assert_eq!(all, expected);
}

/// Cancelling a queued task drops it without running the body
#[tokio::test]
async fn test_cancel_queued_task_never_runs() {
    let manager = TaskManager::with_max_workers(1);
    let gate = Arc::new(Notify::new());
    let started = Arc::new(Mutex::new(Vec::new()));
    let blocker = manager.submit(gated_task("blocker", gate.clone(), started.clone())).unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let queued = manager
        .submit(Task::new("queued", move |_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), TaskError>(())
        }))
        .unwrap();
    assert!(queued.state().is_queued());

    queued.cancel().unwrap();
    assert!(matches!(queued.state(), TaskState::Cancelled { .. }));
    assert_eq!(manager.queued_count(), 0);

    gate.notify_one();
    assert!(matches!(blocker.wait().await, TaskState::Completed { .. }));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(manager.running_count(), 0);
}

/// A running task that is cancelled never ends up Completed
#[tokio::test]
async fn test_cancel_running_task_is_not_completed() {
    let manager = TaskManager::with_max_workers(2);

    // Body returns Ok after noticing cancellation
    let polite = manager
        .submit(Task::new("polite", |ctx| async move {
            while !ctx.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Ok::<(), TaskError>(())
        }))
        .unwrap();

    // Unrelated task keeps running
    let bystander = manager
        .submit(Task::new("bystander", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<(), TaskError>(())
        }))
        .unwrap();

    assert_ok!(manager.cancel(polite.id()));
    let state = polite.wait().await;
    assert!(matches!(state, TaskState::Cancelled { .. } | TaskState::Failed { .. }));
    assert!(!matches!(state, TaskState::Completed { .. }));

    assert!(matches!(bystander.wait().await, TaskState::Completed { .. }));
}

/// Cancelling a finished task is a no-op, unknown ids are reported
#[tokio::test]
async fn test_cancel_after_completion_and_unknown_id() {
    let manager = TaskManager::default();
    let handle = manager
        .submit(Task::new("quick", |_ctx| async { Ok::<(), TaskError>(()) }))
        .unwrap();
    handle.wait().await;

    assert_ok!(handle.cancel());
    assert!(matches!(handle.state(), TaskState::Completed { .. }));
    assert_eq!(assert_err!(manager.cancel(TaskId(999))), TaskError::NotFound(TaskId(999)));
}

/// Progress reported by the body is visible on the handle and in snapshots
#[tokio::test]
async fn test_progress_is_observable() {
    let manager = TaskManager::default();
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let handle = manager
        .submit(Task::new("progress", move |ctx| async move {
            ctx.set_progress(40.0);
            release.notified().await;
            ctx.set_progress(100.0);
            Ok::<(), TaskError>(())
        }))
        .unwrap();

    eventually("progress 40", || handle.progress() == 40.0).await;
    gate.notify_one();
    handle.wait().await;

    let snapshot = manager.list().into_iter().find(|info| info.id == handle.id()).unwrap();
    assert_eq!(snapshot.progress, 100.0);
    assert!(snapshot.is_done());

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["name"], "progress");
}

/// Events follow the lifecycle of each task
#[tokio::test]
async fn test_event_stream_follows_lifecycle() {
    let manager = TaskManager::with_max_workers(1);
    let mut events = manager.events();

    let ok = manager
        .submit(Task::new("ok", |_ctx| async { Ok::<(), TaskError>(()) }))
        .unwrap();
    ok.wait().await;
    let bad = manager
        .submit(Task::new("bad", |_ctx| async { Err::<(), _>("broken pipe") }))
        .unwrap();
    bad.wait().await;

    let mut seen: HashMap<TaskId, Vec<&'static str>> = HashMap::new();
    for _ in 0..6 {
        let event = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream ended");
        if let TaskEvent::Failed { error, .. } = &event {
            assert_eq!(error, "broken pipe");
        }
        seen.entry(event.task_id()).or_default().push(event.event_name());
    }

    assert_eq!(seen[&ok.id()], vec!["submitted", "started", "completed"]);
    assert_eq!(seen[&bad.id()], vec!["submitted", "started", "failed"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// No burst ever pushes more than `slots` bodies into execution
    #[test]
    fn prop_concurrency_bound_holds(slots in 1usize..5, burst in 1usize..20) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (peak, ids) = runtime.block_on(async move {
            let manager = TaskManager::with_max_workers(slots);
            let current = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for i in 0..burst {
                let current = current.clone();
                let peak = peak.clone();
                handles.push(
                    manager
                        .submit(Task::new(format!("burst-{}", i), move |_ctx| async move {
                            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            current.fetch_sub(1, Ordering::SeqCst);
                            Ok::<(), TaskError>(())
                        }))
                        .unwrap(),
                );
                assert!(manager.running_count() <= slots);
            }

            for handle in &handles {
                handle.wait().await;
            }
            let ids: Vec<u64> = handles.iter().map(|h| h.id().as_u64()).collect();
            (peak.load(Ordering::SeqCst), ids)
        });

        prop_assert!(peak <= slots);
        prop_assert_eq!(ids, (1..=burst as u64).collect::<Vec<_>>());
    }
}
