use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::resolver::{clean_path, join_path};
use crate::{FileStream, ProgressFn, StorageBackend, StorageCapabilities, UploadError, UploadResult};

const CHUNK_SIZE: usize = 8 * 1024;

/// In-process storage backend.
///
/// Keeps every stored file in memory, keyed by its full backend-local path.
/// Useful for tests and for mounting scratch space next to real drivers.
pub struct MemoryStorage {
    mount_path: String,
    capabilities: StorageCapabilities,
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new(mount_path: impl AsRef<str>) -> Self {
        Self {
            mount_path: clean_path(mount_path.as_ref()),
            capabilities: StorageCapabilities::new("memory"),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Same storage, but refusing uploads
    pub fn read_only(mut self) -> Self {
        self.capabilities = self.capabilities.read_only();
        self
    }

    /// Content stored at a backend-local path
    pub fn get(&self, actual_path: &str) -> Option<Bytes> {
        self.files.read().get(&clean_path(actual_path)).cloned()
    }

    /// All stored paths, sorted
    pub fn list(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("mount_path", &self.mount_path)
            .field("capabilities", &self.capabilities)
            .field("files", &self.len())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn capabilities(&self) -> StorageCapabilities {
        self.capabilities.clone()
    }

    #[instrument(skip(self, cancel, stream, progress), fields(file = %stream.name()))]
    async fn put(
        &self,
        cancel: &CancellationToken,
        actual_path: &str,
        mut stream: FileStream,
        progress: Option<ProgressFn>,
    ) -> UploadResult<()> {
        if !self.capabilities.allows_upload {
            return Err(UploadError::upload_not_supported(&self.mount_path));
        }

        let total = stream.size().filter(|size| *size > 0);
        let mut content = BytesMut::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                read = stream.read(&mut chunk) => read.map_err(UploadError::transfer)?,
            };
            if read == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..read]);

            if let (Some(total), Some(report)) = (total, progress.as_ref()) {
                report(content.len() as f64 * 100.0 / total as f64);
            }
        }

        let path = join_path(actual_path, stream.name());
        debug!("Stored {} bytes at [{}]({})", content.len(), self.mount_path, path);
        self.files.write().insert(path, content.freeze());

        if let Some(report) = progress {
            report(100.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn stores_under_directory_and_reports_progress() {
        let storage = MemoryStorage::new("/mem");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p));

        let payload = vec![42u8; CHUNK_SIZE * 2 + 10];
        let stream = FileStream::from_bytes("big.bin", payload.clone());
        storage
            .put(&CancellationToken::new(), "/backups/", stream, Some(progress))
            .await
            .unwrap();

        assert_eq!(storage.list(), vec!["/backups/big.bin".to_string()]);
        assert_eq!(storage.get("/backups/big.bin").unwrap().as_ref(), payload.as_slice());

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 3);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let storage = MemoryStorage::new("/mem");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = storage
            .put(&cancel, "/", FileStream::from_bytes("a.txt", "abc"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn cancel_interrupts_stalled_reader() {
        let storage = Arc::new(MemoryStorage::new("/mem"));
        let cancel = CancellationToken::new();
        // Keep the writer alive so reads stall instead of hitting EOF
        let (_writer, reader) = tokio::io::duplex(64);

        let put = tokio::spawn({
            let storage = storage.clone();
            let cancel = cancel.clone();
            async move {
                storage
                    .put(&cancel, "/", FileStream::new("stalled.bin", reader), None)
                    .await
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_millis(500), put)
            .await
            .expect("put returned after cancellation")
            .unwrap();
        assert!(matches!(result, Err(UploadError::Cancelled)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn read_only_refuses_put() {
        let storage = MemoryStorage::new("/ro").read_only();
        assert!(!storage.capabilities().allows_upload);

        let err = storage
            .put(&CancellationToken::new(), "/", FileStream::from_bytes("a.txt", "abc"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::UploadNotSupported { .. }));
    }
}
