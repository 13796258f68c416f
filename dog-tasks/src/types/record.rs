use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, TaskState};

/// Point-in-time snapshot of a tracked task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Unique task identifier
    pub id: TaskId,

    /// Human-readable description
    pub name: String,

    /// Current lifecycle state
    pub state: TaskState,

    /// Progress reported by the body, 0.0 to 100.0
    pub progress: f64,

    /// When the task was submitted
    pub created_at: DateTime<Utc>,
}

impl TaskInfo {
    /// Check if the task reached a terminal state
    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }
}
