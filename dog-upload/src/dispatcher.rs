use std::sync::Arc;

use dog_tasks::{CancellationToken, Task, TaskContext, TaskError, TaskHandle, TaskManager};
use tracing::{debug, info, instrument};

use crate::staging::materialize;
use crate::{
    Destination, FileStream, ProgressFn, Stager, StorageResolver, TempFileStager, UploadConfig,
    UploadError, UploadResult,
};

/// Routes uploads to the storage that owns their destination path.
///
/// Uploads either run in the background as tracked tasks
/// ([`put_as_task`](Self::put_as_task)) or on the caller
/// ([`put_directly`](Self::put_directly)). Both fail fast, before any task
/// exists, when the path cannot be resolved or the storage refuses uploads.
#[derive(Clone)]
pub struct UploadDispatcher {
    resolver: Arc<dyn StorageResolver>,
    tasks: TaskManager,
    stager: Arc<dyn Stager>,
}

impl UploadDispatcher {
    /// Create a dispatcher staging into the system temp directory
    pub fn new(resolver: Arc<dyn StorageResolver>, tasks: TaskManager) -> Self {
        Self {
            resolver,
            tasks,
            stager: Arc::new(TempFileStager::new()),
        }
    }

    /// Create a dispatcher and its task manager from configuration
    pub fn from_config(resolver: Arc<dyn StorageResolver>, config: &UploadConfig) -> Self {
        let stager = match &config.temp_dir {
            Some(dir) => TempFileStager::in_dir(dir),
            None => TempFileStager::new(),
        };
        Self {
            resolver,
            tasks: TaskManager::new(config.tasks.clone()),
            stager: Arc::new(stager),
        }
    }

    /// Replace the staging strategy
    pub fn with_stager<S: Stager + 'static>(mut self, stager: S) -> Self {
        self.stager = Arc::new(stager);
        self
    }

    /// Task manager running deferred transfers
    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Upload `stream` into the directory `dst_path` as a background task.
    ///
    /// Resolution, capability and staging failures, and a shut down task
    /// manager, are returned here and create no task. Once a handle is returned, the transfer outcome is only
    /// visible on the task.
    #[instrument(skip(self, stream), fields(file = %stream.name()))]
    pub async fn put_as_task(&self, dst_path: &str, mut stream: FileStream) -> UploadResult<TaskHandle> {
        let destination = self.destination(dst_path)?;
        if self.tasks.is_shut_down() {
            return Err(TaskError::ShutDown.into());
        }

        if materialize(self.stager.as_ref(), &mut stream).await? {
            debug!("Staged {} before deferring its transfer", stream.name());
        }

        let name = format!("upload {} to {}", stream.name(), destination);
        let transfer = Transfer {
            destination,
            stream,
        };
        let handle = self
            .tasks
            .submit(Task::new(name, move |ctx| transfer.run(ctx)))?;

        info!("Deferred upload as task {}", handle.id());
        Ok(handle)
    }

    /// Upload `stream` into the directory `dst_path` on the calling task.
    ///
    /// The stream is handed to the storage as is; nothing is staged and no
    /// task is created.
    #[instrument(skip(self, cancel, stream), fields(file = %stream.name()))]
    pub async fn put_directly(
        &self,
        cancel: &CancellationToken,
        dst_path: &str,
        stream: FileStream,
    ) -> UploadResult<()> {
        let destination = self.destination(dst_path)?;
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        destination
            .storage
            .put(cancel, &destination.actual_path, stream, None)
            .await
    }

    fn destination(&self, dst_path: &str) -> UploadResult<Destination> {
        let destination = self.resolver.resolve(dst_path)?;
        if !destination.storage.capabilities().allows_upload {
            return Err(UploadError::upload_not_supported(destination.mount_path()));
        }
        Ok(destination)
    }
}

impl std::fmt::Debug for UploadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadDispatcher")
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

/// Everything a deferred upload needs, moved into its task body
struct Transfer {
    destination: Destination,
    stream: FileStream,
}

impl Transfer {
    async fn run(self, ctx: TaskContext) -> UploadResult<()> {
        let Transfer {
            destination,
            stream,
        } = self;

        let sink = ctx.clone();
        let progress: ProgressFn = Arc::new(move |percent| sink.set_progress(percent));

        destination
            .storage
            .put(
                ctx.cancellation_token(),
                &destination.actual_path,
                stream,
                Some(progress),
            )
            .await
    }
}
