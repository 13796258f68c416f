use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Lifecycle events broadcast by the task manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    /// Task was registered and given an identifier
    Submitted {
        task_id: TaskId,
        name: String,
        at: DateTime<Utc>,
    },

    /// Task took an execution slot
    Started {
        task_id: TaskId,
        at: DateTime<Utc>,
    },

    /// Task completed successfully
    Completed {
        task_id: TaskId,
        at: DateTime<Utc>,
    },

    /// Task body returned an error
    Failed {
        task_id: TaskId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Task was cancelled
    Cancelled {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Started { .. } => "started",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Get the task ID from any event
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Submitted { task_id, .. }
            | Self::Started { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Cancelled { task_id, .. } => *task_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Submitted { at, .. }
            | Self::Started { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::Cancelled { at, .. } => at,
        }
    }
}
