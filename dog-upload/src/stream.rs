use std::fmt;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncSeekExt, ReadBuf};
use tokio_util::io::StreamReader;

/// Stream of bytes for upload content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

/// Local copy of an upload's content, deleted when dropped
pub struct StagedFile {
    file: tokio::fs::File,
    path: TempPath,
    len: u64,
}

impl StagedFile {
    /// Wrap a temp file that holds `len` bytes and is positioned at offset 0
    pub fn new(file: tokio::fs::File, path: TempPath, len: u64) -> Self {
        Self { file, path, len }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedFile")
            .field("path", &self.path())
            .field("len", &self.len)
            .finish()
    }
}

enum Source {
    Live(Box<dyn AsyncRead + Send + Unpin>),
    Staged(StagedFile),
}

/// An in-flight upload payload.
///
/// Carries the logical file name, the declared size (if known) and whether
/// the content must be staged locally before it can be handed to a storage.
/// The underlying reader can be replaced once with a [`StagedFile`].
pub struct FileStream {
    name: String,
    size: Option<u64>,
    mimetype: Option<String>,
    modified: Option<DateTime<Utc>>,
    needs_store: bool,
    source: Source,
}

impl FileStream {
    /// Create a stream over any async reader
    pub fn new<S, R>(name: S, reader: R) -> Self
    where
        S: Into<String>,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            size: None,
            mimetype: None,
            modified: None,
            needs_store: false,
            source: Source::Live(Box::new(reader)),
        }
    }

    /// Create a stream over a chunked byte stream
    pub fn from_stream<S: Into<String>>(name: S, body: ByteStream) -> Self {
        Self::new(name, StreamReader::new(body))
    }

    /// Create a stream over an in-memory buffer; the size is taken from the buffer
    pub fn from_bytes<S: Into<String>>(name: S, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::new(name, io::Cursor::new(data)).with_size(size)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_mimetype<S: Into<String>>(mut self, mimetype: S) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Mark the content as needing local staging before transfer
    pub fn with_needs_store(mut self, needs_store: bool) -> Self {
        self.needs_store = needs_store;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size, if known
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Whether the content must be staged before a deferred transfer
    pub fn needs_store(&self) -> bool {
        self.needs_store
    }

    /// Whether the reader was already replaced by a staged copy
    pub fn is_staged(&self) -> bool {
        matches!(self.source, Source::Staged(_))
    }

    /// Path of the staged copy, if any
    pub fn staged_path(&self) -> Option<&Path> {
        match &self.source {
            Source::Staged(staged) => Some(staged.path()),
            Source::Live(_) => None,
        }
    }

    /// Swap the live reader for a staged copy.
    ///
    /// Fails if the stream was already staged. An unknown size, or a declared
    /// size of zero, is filled in from the staged length.
    pub fn replace_with_staged(&mut self, staged: StagedFile) -> Result<(), StagedFile> {
        if self.is_staged() {
            return Err(staged);
        }
        if matches!(self.size, None | Some(0)) {
            self.size = Some(staged.len());
        }
        self.source = Source::Staged(staged);
        Ok(())
    }

    /// Seek a staged stream back to its first byte so it can be read again
    pub async fn rewind(&mut self) -> io::Result<()> {
        match &mut self.source {
            Source::Staged(staged) => staged.file.seek(SeekFrom::Start(0)).await.map(|_| ()),
            Source::Live(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "live streams can only be read once",
            )),
        }
    }
}

impl AsyncRead for FileStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().source {
            Source::Live(reader) => Pin::new(reader).poll_read(cx, buf),
            Source::Staged(staged) => Pin::new(&mut staged.file).poll_read(cx, buf),
        }
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mimetype", &self.mimetype)
            .field("needs_store", &self.needs_store)
            .field("staged", &self.staged_path())
            .finish()
    }
}
