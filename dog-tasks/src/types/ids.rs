use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a task when it is submitted.
///
/// Identifiers come from a monotonic counter owned by the
/// [`TaskManager`](crate::TaskManager): the first task gets `1` and every
/// later submission gets a strictly greater value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the raw counter value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
