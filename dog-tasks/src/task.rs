use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{manager::Shared, BoxError, TaskId, TaskInfo, TaskResult, TaskState};

pub(crate) type TaskBody =
    Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// A unit of deferred work: a description plus the body to run.
///
/// The body receives a [`TaskContext`] carrying the task's identifier, its
/// cancellation token and a progress sink. Everything else the body needs
/// must be moved into the closure.
pub struct Task {
    pub(crate) name: String,
    pub(crate) body: TaskBody,
}

impl Task {
    /// Create a task from a description and an async body
    pub fn new<F, Fut, E>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            name: name.into(),
            body: Box::new(move |ctx| {
                async move { body(ctx).await.map_err(Into::<BoxError>::into) }.boxed()
            }),
        }
    }

    /// Human-readable description
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Progress percentage shared between a running body and observers.
///
/// Stored as the bit pattern of an `f64` so readers never lock.
#[derive(Debug, Default)]
pub(crate) struct Progress(AtomicU64);

impl Progress {
    fn set(&self, percent: f64) {
        if percent.is_nan() {
            return;
        }
        self.0.store(percent.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Execution context handed to a task body
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    cancel: CancellationToken,
    progress: Arc<Progress>,
}

impl TaskContext {
    /// Identifier of the running task
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Token cancelled when the task is cancelled or the manager shuts down
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Report progress as a percentage; values are clamped to 0..=100
    pub fn set_progress(&self, percent: f64) {
        self.progress.set(percent);
    }

    /// Last reported progress
    pub fn progress(&self) -> f64 {
        self.progress.get()
    }
}

/// Registry entry for a submitted task
pub(crate) struct TaskEntry {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) cancel: CancellationToken,
    progress: Arc<Progress>,
    state: watch::Sender<TaskState>,
}

impl TaskEntry {
    pub(crate) fn new(id: TaskId, name: String) -> Self {
        let (state, _) = watch::channel(TaskState::Queued);
        Self {
            id,
            name,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            progress: Arc::new(Progress::default()),
            state,
        }
    }

    pub(crate) fn context(&self) -> TaskContext {
        TaskContext {
            id: self.id,
            cancel: self.cancel.clone(),
            progress: self.progress.clone(),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Move to `next` unless a terminal state was already reached
    pub(crate) fn transition(&self, next: TaskState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    pub(crate) fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            state: self.state(),
            progress: self.progress.get(),
            created_at: self.created_at,
        }
    }
}

/// Handle to a submitted task
#[derive(Clone)]
pub struct TaskHandle {
    entry: Arc<TaskEntry>,
    manager: Arc<Shared>,
}

impl TaskHandle {
    pub(crate) fn new(entry: Arc<TaskEntry>, manager: Arc<Shared>) -> Self {
        Self { entry, manager }
    }

    pub fn id(&self) -> TaskId {
        self.entry.id
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.entry.state()
    }

    /// Last progress reported by the body
    pub fn progress(&self) -> f64 {
        self.entry.progress.get()
    }

    /// Snapshot of the task
    pub fn info(&self) -> TaskInfo {
        self.entry.info()
    }

    /// Request cancellation.
    ///
    /// A queued task is dropped from the wait line without its body ever
    /// running; a running body is signalled through its token.
    pub fn cancel(&self) -> TaskResult<()> {
        self.manager.cancel(self.entry.id)
    }

    /// Wait until the task reaches a terminal state
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.entry.state.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.is_terminal() {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.entry.state();
            }
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.entry.id)
            .field("name", &self.entry.name)
            .field("state", &self.entry.state())
            .finish()
    }
}
