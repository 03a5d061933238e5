//! Lazily produced directory listings.

use std::time::SystemTime;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};

/// Metadata for one file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Final path segment.
    pub name: String,
    /// Absolute store path.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Length in bytes; zero for directories.
    pub len: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

/// A listing fed by a background task through a bounded channel.
///
/// Dropping the listing stops the producer.
#[derive(Debug)]
pub struct RootListing {
    receiver: mpsc::Receiver<DirEntry>,
    done: CancellationToken,
}

impl RootListing {
    pub(crate) fn spawn(
        entries: Vec<DirEntry>,
        capacity: usize,
        done: CancellationToken,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let producer_done = done.clone();
        runtime.spawn(async move {
            for entry in entries {
                tokio::select! {
                    biased;
                    () = producer_done.cancelled() => return,
                    sent = sender.send(entry) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(Self { receiver, done })
    }

    /// Returns up to `count` entries. A shorter page means the listing is done.
    pub async fn readdir(&mut self, count: usize) -> Vec<DirEntry> {
        let mut page = Vec::with_capacity(count);
        while page.len() < count {
            match self.receiver.recv().await {
                Some(entry) => page.push(entry),
                None => break,
            }
        }
        page
    }
}

impl Drop for RootListing {
    fn drop(&mut self) {
        self.done.cancel();
    }
}
