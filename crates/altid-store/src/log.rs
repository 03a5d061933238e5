//! Growable, truncatable byte logs.
//!
//! A [`ByteLog`] holds the complete contents of one synthetic file. Writers
//! append under the exclusive side of a reader/writer lock and fan every write
//! out to live subscriptions before releasing it, so each subscriber sees the
//! same total order the writers produced. Readers copy under the shared side
//! and never observe a write in progress.

use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::warn;

use crate::backing::BackingFile;
use crate::error::{Result, StoreError};
use crate::stream::Listeners;
use crate::STORE_TARGET;

/// First allocation made for a log that receives data.
pub const INITIAL_CAPACITY: usize = 512;

/// Result of a positional read.
///
/// `at_end` distinguishes "caught up, more may arrive" from a short read in the
/// middle of the data; it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes copied into the caller's buffer.
    pub bytes: usize,
    /// Whether the read reached the current end of the data.
    pub at_end: bool,
}

#[derive(Debug)]
pub(crate) struct LogData {
    pub(crate) bytes: Vec<u8>,
    pub(crate) closed: bool,
    modified: SystemTime,
}

impl LogData {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            closed: false,
            modified: SystemTime::now(),
        }
    }

    /// Makes room for `additional` bytes at the tail.
    ///
    /// Fits within spare capacity when possible. The log never discards a
    /// consumed prefix, so the remaining case is a reallocation to the larger
    /// of the required size and twice the current capacity.
    fn reserve_tail(&mut self, additional: usize) {
        let len = self.bytes.len();
        let capacity = self.bytes.capacity();
        if capacity - len >= additional {
            return;
        }
        let required = len.saturating_add(additional);
        let target = if capacity == 0 {
            required.max(INITIAL_CAPACITY)
        } else {
            required.max(capacity.saturating_mul(2))
        };
        self.bytes.reserve_exact(target - len);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(StoreError::ClosedFileAccess)
        } else {
            Ok(())
        }
    }

    fn touch(&mut self) {
        self.modified = SystemTime::now();
    }
}

/// One synthetic file's bytes plus its live subscriber registry.
#[derive(Debug)]
pub struct ByteLog {
    path: String,
    pub(crate) data: RwLock<LogData>,
    pub(crate) listeners: Listeners,
    backing: Option<BackingFile>,
}

impl ByteLog {
    /// Creates an empty log for `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_contents(path, Vec::new())
    }

    /// Creates a log for `path` holding `contents`.
    #[must_use]
    pub fn with_contents(path: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data: RwLock::new(LogData::new(contents)),
            listeners: Listeners::default(),
            backing: None,
        }
    }

    pub(crate) fn backed(path: impl Into<String>, contents: Vec<u8>, backing: BackingFile) -> Self {
        Self {
            backing: Some(backing),
            ..Self::with_contents(path, contents)
        }
    }

    /// Store path of this log, e.g. `/irc/feed`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Appends `buf`, returning the number of bytes written.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut data = self.data.write();
        data.ensure_open()?;
        data.reserve_tail(buf.len());
        data.bytes.extend_from_slice(buf);
        data.touch();
        if !buf.is_empty() {
            self.listeners.broadcast(buf);
            self.mirror(buf);
        }
        Ok(buf.len())
    }

    /// Replaces the whole contents in one step.
    ///
    /// Readers see either the old or the new contents, never an empty file in
    /// between. Subscribers receive the new contents as one chunk.
    pub fn replace(&self, contents: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        data.ensure_open()?;
        data.bytes.clear();
        data.reserve_tail(contents.len());
        data.bytes.extend_from_slice(contents);
        data.touch();
        if !contents.is_empty() {
            self.listeners.broadcast(contents);
        }
        Ok(())
    }

    /// Copies data starting at `offset` into `buf`.
    ///
    /// Offsets past the end yield zero bytes with `at_end` set.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<ReadOutcome> {
        let data = self.data.read();
        data.ensure_open()?;
        let len = data.bytes.len();
        let start = usize::try_from(offset).map_or(len, |offset| offset.min(len));
        let available = data.bytes.get(start..).unwrap_or_default();
        let count = available.len().min(buf.len());
        if let (Some(target), Some(source)) = (buf.get_mut(..count), available.get(..count)) {
            target.copy_from_slice(source);
        }
        Ok(ReadOutcome {
            bytes: count,
            at_end: start + count >= len,
        })
    }

    /// Shrinks the log to `len` bytes.
    ///
    /// Truncating to zero releases the allocation instead of keeping a large
    /// empty buffer around.
    pub fn truncate(&self, len: u64) -> Result<()> {
        let mut data = self.data.write();
        data.ensure_open()?;
        let current = data.bytes.len();
        let invalid = || StoreError::InvalidTruncate {
            requested: len,
            length: current as u64,
        };
        let requested = usize::try_from(len).map_err(|_| invalid())?;
        if requested > current {
            return Err(invalid());
        }
        if requested == 0 {
            data.bytes = Vec::with_capacity(INITIAL_CAPACITY);
        } else {
            data.bytes.truncate(requested);
        }
        data.touch();
        Ok(())
    }

    /// Current length in bytes.
    pub fn len(&self) -> Result<u64> {
        let data = self.data.read();
        data.ensure_open()?;
        Ok(data.bytes.len() as u64)
    }

    /// Whether the log holds no bytes.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Time of the last mutation.
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        self.data.read().modified
    }

    /// Copy of the full contents.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let data = self.data.read();
        data.ensure_open()?;
        Ok(data.bytes.clone())
    }

    /// Marks the log closed and ends every subscription on it.
    ///
    /// Later operations through any handle fail with
    /// [`StoreError::ClosedFileAccess`].
    pub fn close(&self) {
        let mut data = self.data.write();
        data.closed = true;
        data.bytes = Vec::new();
        self.listeners.detach_all();
    }

    /// Whether [`ByteLog::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.data.read().closed
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners.count()
    }

    /// Drops every subscription; their feeds drain and then end.
    pub fn detach_subscribers(&self) -> usize {
        self.listeners.detach_all()
    }

    fn mirror(&self, buf: &[u8]) {
        let Some(backing) = &self.backing else {
            return;
        };
        if let Err(error) = backing.append(buf) {
            warn!(
                target: STORE_TARGET,
                %error,
                path = %backing.path(),
                "failed to mirror write to backing log"
            );
        }
    }
}
