//! Error types for the buffer store.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors returned by the store, its file handles and its subscriptions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing exists at the requested path.
    #[error("no such file or directory: {path}")]
    PathNotFound {
        /// Requested path.
        path: String,
    },
    /// The path contains `.` or `..`, or names nothing.
    #[error("invalid path: {path}")]
    InvalidPath {
        /// Rejected path.
        path: String,
    },
    /// A buffer with this name already exists.
    #[error("buffer already exists: {name}")]
    DuplicateBuffer {
        /// Buffer name.
        name: String,
    },
    /// No buffer with this name exists.
    #[error("no such buffer: {name}")]
    BufferNotFound {
        /// Buffer name.
        name: String,
    },
    /// The path names a directory where a file was expected.
    #[error("not a file: {path}")]
    NotAFile {
        /// Offending path.
        path: String,
    },
    /// The handle or its log has been closed.
    #[error("operation on closed file")]
    ClosedFileAccess,
    /// Truncation may only shrink.
    #[error("cannot truncate {length} byte file to {requested} bytes")]
    InvalidTruncate {
        /// Requested length.
        requested: u64,
        /// Length at the time of the call.
        length: u64,
    },
    /// The seek target lies before the start of the file.
    #[error("seek to negative offset {offset}")]
    InvalidSeek {
        /// Resolved target offset.
        offset: i128,
    },
    /// A file is still being tailed.
    #[error("{path} has {subscribers} live stream(s)")]
    ActiveStreamOnDelete {
        /// Path of the tailed file.
        path: String,
        /// Number of live subscriptions.
        subscribers: usize,
    },
    /// Streams and listings run a forwarding task and need a Tokio runtime.
    #[error("no Tokio runtime to drive the feed")]
    NoRuntime,
    /// Opening or reading a backing log failed.
    #[error("backing log {path}: {source}")]
    Backing {
        /// Backing file location.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    pub(crate) fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    pub(crate) fn missing_buffer(name: impl Into<String>) -> Self {
        Self::BufferNotFound { name: name.into() }
    }

    /// Maps the error onto the closest [`io::ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::PathNotFound { .. } | Self::BufferNotFound { .. } => io::ErrorKind::NotFound,
            Self::DuplicateBuffer { .. } => io::ErrorKind::AlreadyExists,
            Self::InvalidPath { .. }
            | Self::InvalidTruncate { .. }
            | Self::InvalidSeek { .. } => io::ErrorKind::InvalidInput,
            Self::NotAFile { .. } => io::ErrorKind::IsADirectory,
            Self::ClosedFileAccess => io::ErrorKind::BrokenPipe,
            Self::ActiveStreamOnDelete { .. } => io::ErrorKind::ResourceBusy,
            Self::NoRuntime => io::ErrorKind::Unsupported,
            Self::Backing { source, .. } => source.kind(),
        }
    }
}

impl From<StoreError> for io::Error {
    fn from(error: StoreError) -> Self {
        Self::new(error.kind(), error)
    }
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
