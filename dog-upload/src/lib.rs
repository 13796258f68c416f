//! # dog-upload: upload dispatch over mounted storages
//!
//! Routes an incoming file stream to the storage mounted at its destination
//! path and transfers it, either in the background as a tracked
//! [`dog_tasks`] task or on the calling task.
//!
//! ## Deferred uploads
//!
//! ```rust
//! use std::sync::Arc;
//! use dog_upload::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> UploadResult<()> {
//! let photos = Arc::new(MemoryStorage::new("/photos"));
//! let mounts = MountTable::new().with_storage(photos.clone())?;
//! let uploads = UploadDispatcher::new(Arc::new(mounts), TaskManager::with_max_workers(3));
//!
//! let handle = uploads
//!     .put_as_task("/photos/2024", FileStream::from_bytes("beach.jpg", vec![0u8; 1024]))
//!     .await?;
//! assert_eq!(handle.name(), "upload beach.jpg to [/photos](/2024)");
//!
//! assert!(matches!(handle.wait().await, TaskState::Completed { .. }));
//! assert_eq!(photos.list(), vec!["/2024/beach.jpg".to_string()]);
//! # Ok(())
//! # }
//! ```
//!
//! Streams flagged with [`FileStream::with_needs_store`] are spooled to a
//! local temp file before the task is created, so the caller's connection can
//! close while the transfer is still queued.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod resolver;
pub mod staging;
pub mod store;
pub mod stream;

pub use config::UploadConfig;
pub use dispatcher::UploadDispatcher;
pub use error::{UploadError, UploadResult};
pub use memory::MemoryStorage;
pub use resolver::{clean_path, join_path, Destination, MountTable, StorageResolver};
pub use staging::{materialize, Stager, TempFileStager};
pub use store::{ProgressFn, StorageBackend, StorageCapabilities};
pub use stream::{ByteStream, FileStream, StagedFile};

pub use dog_tasks;

/// Convenient imports
pub mod prelude {
    pub use crate::{
        Destination, FileStream, MemoryStorage, MountTable, StorageBackend, StorageCapabilities,
        StorageResolver, UploadConfig, UploadDispatcher, UploadError, UploadResult,
    };
    pub use dog_tasks::{CancellationToken, TaskHandle, TaskId, TaskManager, TaskState};
}
