//! Append-only backing files for log-backed storage.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;

use crate::error::{Result, StoreError};

/// Backing log for one buffer's content file.
#[derive(Debug)]
pub(crate) struct BackingFile {
    path: Utf8PathBuf,
    file: Mutex<File>,
}

impl BackingFile {
    /// Opens `<dir>/<buffer>` for appending and returns any earlier history.
    pub(crate) fn open(dir: &Utf8Path, buffer: &str) -> Result<(Self, Vec<u8>)> {
        let backing_error = |path: &Utf8Path, source| StoreError::Backing {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(|source| backing_error(dir, source))?;

        let path = dir.join(buffer);
        let history = match fs::read(&path) {
            Ok(history) => history,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(backing_error(&path, source)),
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| backing_error(&path, source))?;

        Ok((
            Self {
                path,
                file: Mutex::new(file),
            },
            history,
        ))
    }

    pub(crate) fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(bytes)?;
        file.flush()
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        (dir, path)
    }

    #[test]
    fn new_backing_files_have_no_history() {
        let (_guard, dir) = temp_dir();
        let (backing, history) = BackingFile::open(&dir, "irc").expect("open backing");
        assert!(history.is_empty());
        assert_eq!(backing.path(), dir.join("irc"));
    }

    #[test]
    fn history_survives_reopening() {
        let (_guard, dir) = temp_dir();
        {
            let (backing, _) = BackingFile::open(&dir, "irc").expect("open backing");
            backing.append(b"one\n").expect("append");
            backing.append(b"two\n").expect("append");
        }
        let (_, history) = BackingFile::open(&dir, "irc").expect("reopen backing");
        assert_eq!(history, b"one\ntwo\n");
    }
}
