use thiserror::Error;

use crate::TaskId;

/// Result type for task manager operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Boxed error returned by task bodies
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the task manager itself.
///
/// Failures of a task body are not reported through this type: they are
/// recorded on the task as [`TaskState::Failed`](crate::TaskState::Failed).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task {0} has not reached a terminal state")]
    NotTerminal(TaskId),

    #[error("Task manager has been shut down")]
    ShutDown,
}
