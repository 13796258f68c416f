use std::path::PathBuf;

use dog_tasks::config::env_key;
use dog_tasks::TaskManagerConfig;
use serde::Deserialize;

/// Configuration for an [`UploadDispatcher`](crate::UploadDispatcher)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory for staged uploads; the system temp directory when unset
    pub temp_dir: Option<PathBuf>,

    /// Background transfer settings
    pub tasks: TaskManagerConfig,
}

impl UploadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_tasks(mut self, tasks: TaskManagerConfig) -> Self {
        self.tasks = tasks;
        self
    }

    /// Shorthand for setting the number of concurrent transfers
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.tasks.max_workers = max_workers;
        self
    }

    /// Defaults overridden by environment variables under `prefix`.
    ///
    /// ```bash
    /// export DOG_UPLOAD__TEMP_DIR=/var/tmp/uploads
    /// export DOG_UPLOAD__TASKS__MAX_WORKERS=5
    /// ```
    pub fn from_env(prefix: &str) -> Self {
        Self::default().with_env(prefix)
    }

    /// Apply environment overrides on top of this config
    pub fn with_env(mut self, prefix: &str) -> Self {
        if let Some(dir) = std::env::var_os(env_key(prefix, "TEMP_DIR")).filter(|v| !v.is_empty()) {
            self.temp_dir = Some(PathBuf::from(dir));
        }
        self.tasks = self.tasks.with_env(&env_key(prefix, "TASKS"));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_env_overrides() {
        std::env::set_var("DOG_UPLOAD_CFG_TEST__TEMP_DIR", "/var/tmp/uploads");
        std::env::set_var("DOG_UPLOAD_CFG_TEST__TASKS__MAX_WORKERS", "5");

        let config = UploadConfig::from_env("DOG_UPLOAD_CFG_TEST");
        assert_eq!(config.temp_dir, Some(PathBuf::from("/var/tmp/uploads")));
        assert_eq!(config.tasks.max_workers, 5);
        assert_eq!(config.tasks.event_capacity, 1000);
    }

    #[test]
    fn deserializes_nested_tasks() {
        let config: UploadConfig =
            serde_json::from_str(r#"{ "tasks": { "max_workers": 1 } }"#).unwrap();
        assert_eq!(config.temp_dir, None);
        assert_eq!(config, UploadConfig::new().with_max_workers(1));
    }
}
