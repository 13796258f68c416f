use serde::Serialize;

use crate::TaskState;

/// Count of tracked tasks per lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskStats {
    pub(crate) fn record(&mut self, state: &TaskState) {
        match state {
            TaskState::Queued => self.queued += 1,
            TaskState::Running { .. } => self.running += 1,
            TaskState::Completed { .. } => self.completed += 1,
            TaskState::Failed { .. } => self.failed += 1,
            TaskState::Cancelled { .. } => self.cancelled += 1,
        }
    }

    /// Total number of tracked tasks
    pub fn total(&self) -> usize {
        self.queued + self.running + self.completed + self.failed + self.cancelled
    }

    /// Tasks not yet in a terminal state
    pub fn active(&self) -> usize {
        self.queued + self.running
    }
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns an error if a global subscriber is already set.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init()
}
