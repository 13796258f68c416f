use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{StorageBackend, UploadError, UploadResult};

/// A virtual path resolved to its owning storage and backend-local path
#[derive(Clone)]
pub struct Destination {
    pub storage: Arc<dyn StorageBackend>,
    pub actual_path: String,
}

impl Destination {
    pub fn new(storage: Arc<dyn StorageBackend>, actual_path: impl Into<String>) -> Self {
        Self {
            storage,
            actual_path: actual_path.into(),
        }
    }

    pub fn mount_path(&self) -> &str {
        self.storage.mount_path()
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("mount_path", &self.mount_path())
            .field("actual_path", &self.actual_path)
            .finish()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]({})", self.mount_path(), self.actual_path)
    }
}

/// Maps virtual paths to storages
pub trait StorageResolver: Send + Sync {
    /// Resolve a virtual path, or fail with [`UploadError::Resolution`]
    fn resolve(&self, virtual_path: &str) -> UploadResult<Destination>;
}

/// Resolver over a set of mounted storages, matching the longest mount path
#[derive(Default)]
pub struct MountTable {
    mounts: RwLock<BTreeMap<String, Arc<dyn StorageBackend>>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a storage at its own mount path
    pub fn mount(&self, storage: Arc<dyn StorageBackend>) -> UploadResult<()> {
        let mount_path = clean_path(storage.mount_path());
        let mut mounts = self.mounts.write();
        if mounts.contains_key(&mount_path) {
            return Err(UploadError::invalid(format!(
                "a storage is already mounted at {}",
                mount_path
            )));
        }
        info!("Mounted {} storage at {}", storage.capabilities().driver, mount_path);
        mounts.insert(mount_path, storage);
        Ok(())
    }

    /// Builder-style [`mount`](Self::mount)
    pub fn with_storage(self, storage: Arc<dyn StorageBackend>) -> UploadResult<Self> {
        self.mount(storage)?;
        Ok(self)
    }

    /// Remove the storage mounted at `mount_path`
    pub fn unmount(&self, mount_path: &str) -> Option<Arc<dyn StorageBackend>> {
        self.mounts.write().remove(&clean_path(mount_path))
    }

    /// Mount paths currently registered, sorted
    pub fn mount_paths(&self) -> Vec<String> {
        self.mounts.read().keys().cloned().collect()
    }
}

impl StorageResolver for MountTable {
    fn resolve(&self, virtual_path: &str) -> UploadResult<Destination> {
        let path = clean_path(virtual_path);
        let mounts = self.mounts.read();

        let (mount_path, storage) = mounts
            .iter()
            .filter(|(mount, _)| is_within(&path, mount))
            .max_by_key(|(mount, _)| mount.len())
            .ok_or_else(|| UploadError::resolution(path.clone()))?;

        let actual_path = clean_path(&path[mount_path.len()..]);
        debug!("Resolved {} to [{}]({})", path, mount_path, actual_path);
        Ok(Destination::new(storage.clone(), actual_path))
    }
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &self.mount_paths())
            .finish()
    }
}

fn is_within(path: &str, mount: &str) -> bool {
    mount == "/"
        || path == mount
        || (path.starts_with(mount) && path.as_bytes().get(mount.len()) == Some(&b'/'))
}

/// Normalize a virtual path: absolute, no empty or `.` segments, `..` resolved
/// lexically, no trailing slash.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Join a directory and a file name into a clean path
pub fn join_path(dir: &str, name: &str) -> String {
    clean_path(&format!("{}/{}", dir, name))
}
