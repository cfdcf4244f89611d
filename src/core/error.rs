//! Error types for the cracking engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, CrackError>;

/// Error type for engine operations.
///
/// Every failure is surfaced to the caller; nothing is retried internally.
#[derive(Error, Debug)]
pub enum CrackError {
    /// Handshake or wordlist source is missing or unreadable.
    #[error("Source not found or unreadable: {path:?}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Capture was read but no complete, usable handshake could be extracted.
    #[error("Handshake parse error: {0}")]
    Parse(String),

    /// Handshake uses a key descriptor version this engine does not implement.
    #[error("Unsupported key descriptor version: {0}")]
    UnsupportedVariant(u8),

    /// Wordlist read failure in the middle of a job.
    #[error("Wordlist I/O error: {0}")]
    Io(#[from] io::Error),

    /// Job range with start past end.
    #[error("Invalid line range: start {start} is past end {end}")]
    InvalidRange { start: u64, end: u64 },
}

/// Fieldless discriminant of [`CrackError`], for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Parse,
    UnsupportedVariant,
    Io,
    InvalidRange,
}

impl CrackError {
    pub(crate) fn not_found(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::NotFound {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Parse(_) => ErrorKind::Parse,
            Self::UnsupportedVariant(_) => ErrorKind::UnsupportedVariant,
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
        }
    }
}

fn copy_io(err: &io::Error) -> io::Error {
    io::Error::new(err.kind(), err.to_string())
}

// io::Error is not Clone; the copy keeps its kind and message
impl Clone for CrackError {
    fn clone(&self) -> Self {
        match self {
            Self::NotFound { path, source } => Self::NotFound {
                path: path.clone(),
                source: copy_io(source),
            },
            Self::Parse(msg) => Self::Parse(msg.clone()),
            Self::UnsupportedVariant(v) => Self::UnsupportedVariant(*v),
            Self::Io(e) => Self::Io(copy_io(e)),
            Self::InvalidRange { start, end } => Self::InvalidRange {
                start: *start,
                end: *end,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = CrackError::not_found("/missing", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(CrackError::parse("x").kind(), ErrorKind::Parse);
        assert_eq!(CrackError::UnsupportedVariant(3).kind(), ErrorKind::UnsupportedVariant);

        let io_err: CrackError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert_eq!(io_err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_clone_keeps_kind_and_message() {
        let err = CrackError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        let copy = err.clone();
        assert_eq!(copy.kind(), ErrorKind::Io);
        assert_eq!(copy.to_string(), err.to_string());
    }

    #[test]
    fn test_messages_are_distinct() {
        let range = CrackError::InvalidRange { start: 5, end: 2 };
        assert!(range.to_string().contains("start 5"));
        assert!(CrackError::UnsupportedVariant(3).to_string().contains('3'));
    }
}
