//! Independently-cursored views over a [`ByteLog`].

use std::io::{self, SeekFrom};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::log::{ByteLog, ReadOutcome};

/// An open file: a shared log plus this handle's own read offset.
#[derive(Debug)]
pub struct FileHandle {
    log: Arc<ByteLog>,
    offset: u64,
    closed: bool,
}

impl FileHandle {
    pub(crate) const fn new(log: Arc<ByteLog>) -> Self {
        Self {
            log,
            offset: 0,
            closed: false,
        }
    }

    /// Store path of the underlying log.
    #[must_use]
    pub fn path(&self) -> &str {
        self.log.path()
    }

    /// The shared log behind this handle.
    #[must_use]
    pub const fn log(&self) -> &Arc<ByteLog> {
        &self.log
    }

    /// Current read offset.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads from the cursor and advances it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        self.ensure_open()?;
        let outcome = self.log.read_at(buf, self.offset)?;
        self.offset += outcome.bytes as u64;
        Ok(outcome)
    }

    /// Reads at `offset` without moving the cursor.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<ReadOutcome> {
        self.ensure_open()?;
        self.log.read_at(buf, offset)
    }

    /// Appends to the log. The read cursor does not move.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        self.log.write(buf)
    }

    /// Shrinks the log to `len` bytes.
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.ensure_open()?;
        self.log.truncate(len)
    }

    /// Moves the cursor, clamping to the current length.
    ///
    /// A target before the start fails with [`StoreError::InvalidSeek`]; a
    /// target past the end lands on the end.
    pub fn seek(&mut self, position: SeekFrom) -> Result<u64> {
        self.ensure_open()?;
        let len = i128::from(self.log.len()?);
        let target = match position {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.offset) + i128::from(delta),
            SeekFrom::End(delta) => len + i128::from(delta),
        };
        if target < 0 {
            return Err(StoreError::InvalidSeek { offset: target });
        }
        self.offset = u64::try_from(target.min(len)).unwrap_or(u64::MAX);
        Ok(self.offset)
    }

    /// Current length of the log.
    pub fn len(&self) -> Result<u64> {
        self.ensure_open()?;
        self.log.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Closes this handle only; other handles on the same log are unaffected.
    pub const fn close(&mut self) {
        self.closed = true;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(StoreError::ClosedFileAccess)
        } else {
            Ok(())
        }
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Self::read(self, buf)?.bytes)
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Self::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for FileHandle {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        Ok(Self::seek(self, position)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Read;

    #[fixture]
    fn handle() -> FileHandle {
        FileHandle::new(Arc::new(ByteLog::with_contents("/irc/feed", b"0123456789".to_vec())))
    }

    #[rstest]
    #[case(SeekFrom::Start(4), 4)]
    #[case(SeekFrom::Start(40), 10)]
    #[case(SeekFrom::End(-3), 7)]
    #[case(SeekFrom::End(5), 10)]
    #[case(SeekFrom::Current(2), 2)]
    fn seek_clamps_to_length(
        mut handle: FileHandle,
        #[case] position: SeekFrom,
        #[case] expected: u64,
    ) {
        assert_eq!(handle.seek(position).expect("seek"), expected);
        assert_eq!(handle.offset(), expected);
    }

    #[rstest]
    fn seeking_before_the_start_fails(mut handle: FileHandle) {
        let error = handle
            .seek(SeekFrom::Current(-1))
            .expect_err("negative target should fail");
        assert!(matches!(error, StoreError::InvalidSeek { offset: -1 }));
        assert_eq!(handle.offset(), 0);
    }

    #[rstest]
    fn handles_keep_independent_cursors(mut handle: FileHandle) {
        let mut other = FileHandle::new(Arc::clone(handle.log()));
        let mut buf = [0_u8; 4];
        handle.read(&mut buf).expect("read first");
        other.read(&mut buf[..2]).expect("read second");
        assert_eq!(handle.offset(), 4);
        assert_eq!(other.offset(), 2);
    }

    #[rstest]
    fn io_read_drains_to_end(mut handle: FileHandle) {
        let mut out = String::new();
        Read::read_to_string(&mut handle, &mut out).expect("read to end");
        assert_eq!(out, "0123456789");
    }

    #[rstest]
    fn closed_handles_refuse_io_but_the_log_lives_on(mut handle: FileHandle) {
        let other = FileHandle::new(Arc::clone(handle.log()));
        handle.close();
        let mut buf = [0_u8; 1];
        assert!(matches!(handle.read(&mut buf), Err(StoreError::ClosedFileAccess)));
        assert!(matches!(handle.seek(SeekFrom::Start(0)), Err(StoreError::ClosedFileAccess)));
        assert!(matches!(handle.truncate(0), Err(StoreError::ClosedFileAccess)));
        assert_eq!(other.write(b"!").expect("other handle writes"), 1);
    }
}
