use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RangeError>;

/// Failures surfaced while opening a source or producing a ranged body.
///
/// A malformed or unsatisfiable `Range` header is not an error, see
/// [`ParseOutcome`](crate::ParseOutcome).
#[derive(Debug, Error)]
pub enum RangeError {
    /// The byte source could not be opened or sized.
    #[error("failed to open {}: {source}", .path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The underlying source reported an I/O error during a pull.
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    /// The source hit EOF before a chunk's declared span was delivered.
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// A previous pull failed; the response must be aborted.
    #[error("producer aborted after an earlier read failure")]
    Poisoned,

    /// The producer was released while bytes were still owed.
    #[error("producer closed with {remaining} bytes undelivered")]
    Closed { remaining: u64 },

    #[error("invalid multipart boundary {0:?}")]
    InvalidBoundary(String),

    #[error("pull buffer size must be non-zero")]
    InvalidBufferSize,
}

impl From<RangeError> for io::Error {
    fn from(err: RangeError) -> io::Error {
        match err {
            RangeError::Io(e) => e,
            RangeError::SourceOpen { source, .. } => source,
            e @ RangeError::ShortRead { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            e => io::Error::other(e),
        }
    }
}
