use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures_core::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::{
    task::{TaskBody, TaskEntry},
    Task, TaskError, TaskEvent, TaskHandle, TaskId, TaskInfo, TaskManagerConfig, TaskResult,
    TaskState, TaskStats,
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Bounded-concurrency task manager.
///
/// At most `max_workers` task bodies run at once; further submissions wait in
/// a first-in-first-run line. Each task owns an independent
/// [`CancellationToken`](tokio_util::sync::CancellationToken) and ends in
/// exactly one of `Completed`, `Failed` or `Cancelled`.
///
/// The manager is a cheap handle over shared state: clone it to hand it to
/// several producers. Submitting spawns onto the ambient Tokio runtime.
#[derive(Clone)]
pub struct TaskManager {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    max_workers: usize,
    next_id: AtomicU64,
    scheduler: Mutex<Scheduler>,
    events: broadcast::Sender<TaskEvent>,
}

#[derive(Default)]
struct Scheduler {
    tasks: BTreeMap<TaskId, Arc<TaskEntry>>,
    waiting: VecDeque<Pending>,
    running: usize,
    shut_down: bool,
}

struct Pending {
    entry: Arc<TaskEntry>,
    body: TaskBody,
}

impl TaskManager {
    /// Create a task manager with the given configuration
    pub fn new(config: TaskManagerConfig) -> Self {
        if config.max_workers == 0 {
            warn!("max_workers is 0, running with a single execution slot");
        }
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                max_workers: config.max_workers.max(1),
                next_id: AtomicU64::new(0),
                scheduler: Mutex::new(Scheduler::default()),
                events,
            }),
        }
    }

    /// Create a task manager with `max_workers` slots and default settings otherwise
    pub fn with_max_workers(max_workers: usize) -> Self {
        Self::new(TaskManagerConfig::new().with_max_workers(max_workers))
    }

    /// Submit a task and return without waiting for it.
    ///
    /// The task starts immediately when a slot is free, otherwise it is
    /// queued behind earlier submissions. Identifiers are only consumed by
    /// accepted submissions.
    #[instrument(skip(self, task), fields(name = %task.name))]
    pub fn submit(&self, task: Task) -> TaskResult<TaskHandle> {
        let Task { name, body } = task;

        let mut scheduler = self.shared.scheduler.lock();
        if scheduler.shut_down {
            return Err(TaskError::ShutDown);
        }

        let id = TaskId(self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let entry = Arc::new(TaskEntry::new(id, name));
        scheduler.tasks.insert(id, entry.clone());

        self.shared.emit(TaskEvent::Submitted {
            task_id: id,
            name: entry.name.clone(),
            at: entry.created_at,
        });

        let pending = Pending {
            entry: entry.clone(),
            body,
        };

        if scheduler.running < self.shared.max_workers {
            scheduler.running += 1;
            drop(scheduler);
            self.shared.start(pending);
        } else {
            scheduler.waiting.push_back(pending);
            debug!(
                "Task {} queued behind {} waiting task(s)",
                id,
                scheduler.waiting.len() - 1
            );
        }

        info!("Submitted task {}: {}", id, entry.name);
        Ok(TaskHandle::new(entry, self.shared.clone()))
    }

    /// Request cancellation of a task
    pub fn cancel(&self, id: TaskId) -> TaskResult<()> {
        self.shared.cancel(id)
    }

    /// Get a handle to a tracked task
    pub fn get(&self, id: TaskId) -> TaskResult<TaskHandle> {
        let scheduler = self.shared.scheduler.lock();
        scheduler
            .tasks
            .get(&id)
            .map(|entry| TaskHandle::new(entry.clone(), self.shared.clone()))
            .ok_or(TaskError::NotFound(id))
    }

    /// Snapshots of all tracked tasks, ordered by identifier
    pub fn list(&self) -> Vec<TaskInfo> {
        let scheduler = self.shared.scheduler.lock();
        scheduler.tasks.values().map(|entry| entry.info()).collect()
    }

    /// Count tracked tasks per state
    pub fn stats(&self) -> TaskStats {
        let scheduler = self.shared.scheduler.lock();
        let mut stats = TaskStats::default();
        for entry in scheduler.tasks.values() {
            stats.record(&entry.state());
        }
        stats
    }

    /// Stop tracking a finished task
    pub fn remove(&self, id: TaskId) -> TaskResult<TaskInfo> {
        let mut scheduler = self.shared.scheduler.lock();
        let entry = scheduler.tasks.get(&id).ok_or(TaskError::NotFound(id))?;
        if !entry.state().is_terminal() {
            return Err(TaskError::NotTerminal(id));
        }
        let info = entry.info();
        scheduler.tasks.remove(&id);
        Ok(info)
    }

    /// Stop tracking every finished task; returns how many were dropped
    pub fn clear_done(&self) -> usize {
        self.retain(|state| !state.is_terminal())
    }

    /// Stop tracking every completed task; failed and cancelled ones stay
    pub fn clear_succeeded(&self) -> usize {
        self.retain(|state| !matches!(state, TaskState::Completed { .. }))
    }

    fn retain(&self, keep: impl Fn(&TaskState) -> bool) -> usize {
        let mut scheduler = self.shared.scheduler.lock();
        let before = scheduler.tasks.len();
        scheduler.tasks.retain(|_, entry| keep(&entry.state()));
        let removed = before - scheduler.tasks.len();
        debug!("Cleared {} task(s)", removed);
        removed
    }

    /// Refuse new submissions and cancel everything outstanding.
    ///
    /// Queued tasks become `Cancelled` without running; running tasks are
    /// signalled and settle once their bodies return.
    pub fn shutdown(&self) {
        let (drained, entries) = {
            let mut scheduler = self.shared.scheduler.lock();
            if scheduler.shut_down {
                return;
            }
            scheduler.shut_down = true;
            let drained: Vec<Pending> = scheduler.waiting.drain(..).collect();
            let entries: Vec<Arc<TaskEntry>> = scheduler.tasks.values().cloned().collect();
            (drained, entries)
        };

        for entry in &entries {
            entry.cancel.cancel();
        }
        for pending in drained {
            self.shared.settle(&pending.entry, TaskState::Cancelled { cancelled_at: Utc::now() });
        }

        info!("Task manager shut down, {} task(s) signalled", entries.len());
    }

    /// Check whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shared.scheduler.lock().shut_down
    }

    /// Configured number of execution slots
    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Number of occupied execution slots
    pub fn running_count(&self) -> usize {
        self.shared.scheduler.lock().running
    }

    /// Number of tasks waiting for a slot
    pub fn queued_count(&self) -> usize {
        self.shared.scheduler.lock().waiting.len()
    }

    /// Raw lifecycle event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }

    /// Lifecycle event stream; lagged events are skipped
    pub fn events(&self) -> BoxStream<TaskEvent> {
        Box::pin(BroadcastStream::new(self.shared.events.subscribe()).filter_map(|event| event.ok()))
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(TaskManagerConfig::default())
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("max_workers", &self.shared.max_workers)
            .field("running", &self.running_count())
            .field("queued", &self.queued_count())
            .finish()
    }
}

impl Shared {
    fn emit(&self, event: TaskEvent) {
        let _ = self.events.send(event);
    }

    /// Launch a task on an already reserved slot
    fn start(self: &Arc<Self>, pending: Pending) {
        let Pending { entry, body } = pending;

        if entry.cancel.is_cancelled() {
            // Cancelled between leaving the wait line and getting here
            drop(body);
            self.settle(&entry, TaskState::Cancelled { cancelled_at: Utc::now() });
            self.release_slot();
            return;
        }

        let started_at = Utc::now();
        entry.transition(TaskState::Running { started_at });
        self.emit(TaskEvent::Started {
            task_id: entry.id,
            at: started_at,
        });
        debug!("Task {} started", entry.id);

        tokio::spawn(self.clone().run(entry, body));
    }

    async fn run(self: Arc<Self>, entry: Arc<TaskEntry>, body: TaskBody) {
        let outcome = AssertUnwindSafe(body(entry.context())).catch_unwind().await;

        let now = Utc::now();
        let next = if entry.cancel.is_cancelled() {
            TaskState::Cancelled { cancelled_at: now }
        } else {
            match outcome {
                Ok(Ok(())) => TaskState::Completed { completed_at: now },
                Ok(Err(err)) => TaskState::Failed {
                    failed_at: now,
                    error: err.to_string(),
                },
                Err(_) => TaskState::Failed {
                    failed_at: now,
                    error: "task body panicked".to_string(),
                },
            }
        };

        self.settle(&entry, next);
        self.release_slot();
    }

    /// Record a terminal state and publish it
    fn settle(&self, entry: &TaskEntry, terminal: TaskState) {
        if !entry.transition(terminal.clone()) {
            return;
        }

        let event = match terminal {
            TaskState::Completed { completed_at } => {
                info!("Task {} completed", entry.id);
                TaskEvent::Completed { task_id: entry.id, at: completed_at }
            }
            TaskState::Failed { failed_at, error } => {
                warn!("Task {} failed: {}", entry.id, error);
                TaskEvent::Failed { task_id: entry.id, error, at: failed_at }
            }
            TaskState::Cancelled { cancelled_at } => {
                info!("Task {} cancelled", entry.id);
                TaskEvent::Cancelled { task_id: entry.id, at: cancelled_at }
            }
            TaskState::Queued | TaskState::Running { .. } => return,
        };
        self.emit(event);
    }

    /// Hand a freed slot to the oldest waiting task, or give it back
    fn release_slot(self: &Arc<Self>) {
        let next = {
            let mut scheduler = self.scheduler.lock();
            loop {
                match scheduler.waiting.pop_front() {
                    Some(pending) if pending.entry.state().is_terminal() => continue,
                    Some(pending) => break Some(pending),
                    None => {
                        scheduler.running = scheduler.running.saturating_sub(1);
                        break None;
                    }
                }
            }
        };

        if let Some(pending) = next {
            self.start(pending);
        }
    }

    pub(crate) fn cancel(&self, id: TaskId) -> TaskResult<()> {
        let (entry, pending) = {
            let mut scheduler = self.scheduler.lock();
            let entry = scheduler.tasks.get(&id).cloned().ok_or(TaskError::NotFound(id))?;
            let position = scheduler.waiting.iter().position(|p| p.entry.id == id);
            let pending = position.and_then(|pos| scheduler.waiting.remove(pos));
            (entry, pending)
        };

        entry.cancel.cancel();
        if let Some(pending) = pending {
            // Never started: the body is dropped unrun
            drop(pending.body);
            self.settle(&entry, TaskState::Cancelled { cancelled_at: Utc::now() });
        }
        debug!("Cancellation requested for task {}", id);
        Ok(())
    }
}
