use serde::Deserialize;
use tracing::warn;

/// Configuration for a [`TaskManager`](crate::TaskManager)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// Number of task bodies allowed to run at the same time
    pub max_workers: usize,

    /// Buffer size of the lifecycle event channel
    pub event_capacity: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            event_capacity: 1000,
        }
    }
}

impl TaskManagerConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of execution slots
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Defaults overridden by environment variables under `prefix`.
    ///
    /// ```bash
    /// export DOG_TASKS__MAX_WORKERS=8
    /// export DOG_TASKS__EVENT_CAPACITY=256
    /// ```
    pub fn from_env(prefix: &str) -> Self {
        Self::default().with_env(prefix)
    }

    /// Apply `PREFIX__KEY` environment overrides on top of this config
    pub fn with_env(mut self, prefix: &str) -> Self {
        if let Some(value) = env_usize(prefix, "MAX_WORKERS") {
            self.max_workers = value;
        }
        if let Some(value) = env_usize(prefix, "EVENT_CAPACITY") {
            self.event_capacity = value;
        }
        self
    }
}

/// Build the `PREFIX__KEY` variable name used for overrides
pub fn env_key(prefix: &str, key: &str) -> String {
    format!("{}__{}", prefix.trim_end_matches('_'), key)
}

fn env_usize(prefix: &str, key: &str) -> Option<usize> {
    let name = env_key(prefix, key);
    let raw = std::env::var(&name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not an unsigned integer", name, raw);
            None
        }
    }
}
