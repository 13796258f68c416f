use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{FileStream, UploadResult};

/// Progress callback, called with a percentage between 0 and 100
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// A storage backend mounted into the aggregator.
///
/// Backends differ only through their [`StorageCapabilities`]; the dispatcher
/// never needs to know which concrete driver it talks to.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Virtual path this storage is mounted at
    fn mount_path(&self) -> &str;

    /// Get storage capabilities
    fn capabilities(&self) -> StorageCapabilities;

    /// Store `stream` inside the directory `actual_path`.
    ///
    /// Implementations should check `cancel` between chunks and return
    /// [`UploadError::Cancelled`](crate::UploadError::Cancelled) promptly.
    async fn put(
        &self,
        cancel: &CancellationToken,
        actual_path: &str,
        stream: FileStream,
        progress: Option<ProgressFn>,
    ) -> UploadResult<()>;
}

/// Storage capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCapabilities {
    /// Driver name, for diagnostics
    pub driver: String,
    pub allows_upload: bool,
}

impl Default for StorageCapabilities {
    fn default() -> Self {
        Self {
            driver: "unknown".to_string(),
            allows_upload: true,
        }
    }
}

impl StorageCapabilities {
    pub fn new<S: Into<String>>(driver: S) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    /// Reject every upload
    pub fn read_only(mut self) -> Self {
        self.allows_upload = false;
        self
    }
}
