use dog_tasks::{BoxError, TaskError};
use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while dispatching an upload
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No storage is mounted at {path}")]
    Resolution { path: String },

    #[error("Upload is not supported by storage {mount_path}")]
    UploadNotSupported { mount_path: String },

    #[error("Failed to stage upload locally: {reason}")]
    Staging {
        reason: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer failed: {source}")]
    Transfer {
        #[source]
        source: BoxError,
    },

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl UploadError {
    /// Create a resolution error for a virtual path
    pub fn resolution<S: Into<String>>(path: S) -> Self {
        Self::Resolution { path: path.into() }
    }

    /// Create an upload-not-supported error for a storage
    pub fn upload_not_supported<S: Into<String>>(mount_path: S) -> Self {
        Self::UploadNotSupported {
            mount_path: mount_path.into(),
        }
    }

    /// Create a staging error from an I/O failure
    pub fn staging<S: Into<String>>(reason: S, source: std::io::Error) -> Self {
        Self::Staging {
            reason: reason.into(),
            source,
        }
    }

    /// Create a transfer error from any backend error
    pub fn transfer<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transfer {
            source: error.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Check if the failure happened before any transfer was attempted
    pub fn is_precheck(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. } | Self::UploadNotSupported { .. } | Self::Staging { .. }
        )
    }
}
