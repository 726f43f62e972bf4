use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{RangeError, Result};

/// Seekable byte storage with a length fixed at construction.
///
/// Reads are positioned: every [`read_at`](ByteSource::read_at) names its
/// own offset, so chunks may be served in any order from one handle.
pub enum ByteSource {
    /// A file opened read-only. Closed when the source is dropped.
    File { file: File, len: u64 },
    /// An in-memory buffer.
    Memory(Bytes),
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSource::File { len, .. } => f.debug_struct("File").field("len", len).finish(),
            ByteSource::Memory(bytes) => f.debug_struct("Memory").field("len", &bytes.len()).finish(),
        }
    }
}

impl ByteSource {
    /// Opens `path` read-only and sizes it from metadata.
    pub async fn open(path: impl AsRef<Path>) -> Result<ByteSource> {
        let path = path.as_ref();
        let open_err = |source| RangeError::SourceOpen { path: PathBuf::from(path), source };
        let file = File::open(path).await.map_err(open_err)?;
        let len = file.metadata().await.map_err(open_err)?.len();
        tracing::debug!(path = %path.display(), len, "opened byte source");
        Ok(ByteSource::File { file, len })
    }

    /// Calls [`tokio::fs::File::metadata`] to determine file size.
    pub async fn file(file: File) -> io::Result<ByteSource> {
        let len = file.metadata().await?.len();
        Ok(ByteSource::File { file, len })
    }

    pub fn memory(bytes: impl Into<Bytes>) -> ByteSource {
        ByteSource::Memory(bytes.into())
    }

    /// Total size of the source in bytes.
    pub fn len(&self) -> u64 {
        match self {
            ByteSource::File { len, .. } => *len,
            ByteSource::Memory(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies bytes starting at `offset` into `buf`.
    ///
    /// Keeps reading until `buf` is full, so a return value smaller than
    /// `buf.len()` always means the source ended first.
    pub async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::File { file, .. } => {
                file.seek(io::SeekFrom::Start(offset)).await?;
                let mut filled = 0;
                while filled < buf.len() {
                    match file.read(&mut buf[filled..]).await {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(filled)
            }
            ByteSource::Memory(bytes) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
                let n = buf.len().min(bytes.len() - start);
                buf[..n].copy_from_slice(&bytes[start..start + n]);
                Ok(n)
            }
        }
    }
}

/// Guesses a `Content-Type` from a file extension.
pub fn content_type_for(path: impl AsRef<Path>) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}
