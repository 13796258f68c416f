use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status lifecycle: `Queued -> Running -> {Completed | Failed | Cancelled}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for a free execution slot
    Queued,

    /// Body is executing on a worker
    Running { started_at: DateTime<Utc> },

    /// Body returned successfully
    Completed { completed_at: DateTime<Utc> },

    /// Body returned an error
    Failed { failed_at: DateTime<Utc>, error: String },

    /// Cancelled while queued, or before the running body returned
    Cancelled { cancelled_at: DateTime<Utc> },
}

impl TaskState {
    /// Check if the task is in a terminal state (completed, failed, or cancelled)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// Check if the task is waiting for a slot
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }

    /// Check if the task body is executing
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Error message of a failed task
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Get the state name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running { .. } => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
