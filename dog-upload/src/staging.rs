use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::{FileStream, StagedFile, UploadError, UploadResult};

/// Spools a stream to durable local storage and returns a seekable copy
#[async_trait]
pub trait Stager: Send + Sync {
    /// Read `stream` to the end and return a staged copy positioned at offset 0
    async fn stage(&self, stream: &mut FileStream) -> UploadResult<StagedFile>;
}

/// Stager backed by named temporary files
#[derive(Debug, Clone, Default)]
pub struct TempFileStager {
    dir: Option<PathBuf>,
}

impl TempFileStager {
    /// Stage into the system temp directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage into a specific directory
    pub fn in_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

#[async_trait]
impl Stager for TempFileStager {
    #[instrument(skip(self, stream), fields(file = %stream.name()))]
    async fn stage(&self, stream: &mut FileStream) -> UploadResult<StagedFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dog-upload-");
        let named = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| UploadError::staging("failed to create temp file", e))?;

        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let written = tokio::io::copy(&mut *stream, &mut file)
            .await
            .map_err(|e| UploadError::staging("failed to spool upload", e))?;
        file.flush()
            .await
            .map_err(|e| UploadError::staging("failed to flush temp file", e))?;

        // Zero means the size was never declared
        if let Some(expected) = stream.size().filter(|size| *size != 0) {
            if expected != written {
                return Err(UploadError::staging(
                    "size mismatch",
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("expected {} bytes, spooled {}", expected, written),
                    ),
                ));
            }
        }

        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| UploadError::staging("failed to rewind temp file", e))?;

        debug!("Staged {} bytes to {}", written, path.display());
        Ok(StagedFile::new(file, path, written))
    }
}

/// Stage `stream` if it declares it needs storage.
///
/// Returns `true` when the reader was replaced. Streams that do not need
/// storage, or that are already staged, are left untouched.
pub async fn materialize(stager: &dyn Stager, stream: &mut FileStream) -> UploadResult<bool> {
    if !stream.needs_store() || stream.is_staged() {
        return Ok(false);
    }

    let staged = stager.stage(stream).await?;
    stream
        .replace_with_staged(staged)
        .map_err(|_| UploadError::invalid(format!("{} is already staged", stream.name())))?;
    Ok(true)
}
