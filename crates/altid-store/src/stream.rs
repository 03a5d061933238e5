//! Live-tail subscriptions over byte logs.
//!
//! Each subscription owns a forwarding task. Writers push chunks into the
//! task's unbounded inbox while holding the log's write lock, which never
//! blocks; the task moves chunks into a bounded delivery channel and is the
//! only party that waits on a slow reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::STORE_TARGET;
use crate::error::{Result, StoreError};
use crate::log::ByteLog;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Listener {
    id: u64,
    inbox: mpsc::UnboundedSender<Bytes>,
}

/// Subscriber registry attached to every [`ByteLog`].
#[derive(Debug, Default)]
pub(crate) struct Listeners {
    entries: Mutex<Vec<Listener>>,
}

impl Listeners {
    fn register(&self, id: u64, inbox: mpsc::UnboundedSender<Bytes>) {
        self.entries.lock().push(Listener { id, inbox });
    }

    /// Pushes a copy of `chunk` to every live listener.
    pub(crate) fn broadcast(&self, chunk: &[u8]) {
        let mut entries = self.entries.lock();
        if entries.is_empty() {
            return;
        }
        let chunk = Bytes::copy_from_slice(chunk);
        entries.retain(|listener| listener.inbox.send(chunk.clone()).is_ok());
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|listener| listener.id != id);
        entries.len() != before
    }

    pub(crate) fn detach_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let detached = entries.len();
        entries.clear();
        detached
    }

    pub(crate) fn count(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|listener| !listener.inbox.is_closed());
        entries.len()
    }
}

/// Creates subscriptions with a fixed per-subscriber delivery capacity.
#[derive(Debug, Clone, Copy)]
pub struct StreamBroker {
    capacity: usize,
}

impl StreamBroker {
    /// Broker whose subscribers buffer up to `capacity` chunks each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to `log`: existing contents first, then every later write.
    ///
    /// The snapshot and the registration happen under the log's shared lock,
    /// so no write can land between them. The feed ends when `scope` is
    /// cancelled, when the subscription is closed, or when the log detaches
    /// its subscribers. Fails with [`StoreError::NoRuntime`] outside a Tokio
    /// runtime, before anything is registered.
    pub fn subscribe(&self, log: &Arc<ByteLog>, scope: &CancellationToken) -> Result<Subscription> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let (inbox, pending) = mpsc::unbounded_channel();
        {
            let data = log.data.read();
            if data.closed {
                return Err(StoreError::ClosedFileAccess);
            }
            if !data.bytes.is_empty() && inbox.send(Bytes::copy_from_slice(&data.bytes)).is_err() {
                return Err(StoreError::ClosedFileAccess);
            }
            log.listeners.register(id, inbox);
        }

        let (outbox, receiver) = mpsc::channel(self.capacity);
        let done = scope.child_token();
        runtime.spawn(forward(pending, outbox, done.clone()));
        debug!(target: STORE_TARGET, id, path = log.path(), "stream subscribed");

        Ok(Subscription {
            id,
            log: Arc::clone(log),
            receiver,
            done,
            closed: false,
        })
    }
}

async fn forward(
    mut pending: mpsc::UnboundedReceiver<Bytes>,
    outbox: mpsc::Sender<Bytes>,
    done: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = done.cancelled() => break,
            next = pending.recv() => next,
        };
        // Inbox closed: the log detached us and everything queued has gone out.
        let Some(chunk) = next else {
            return;
        };
        let permit = tokio::select! {
            biased;
            () = done.cancelled() => {
                if outbox.try_send(chunk).is_err() {
                    return;
                }
                break;
            }
            permit = outbox.reserve() => permit,
        };
        match permit {
            Ok(permit) => permit.send(chunk),
            Err(_) => return,
        }
    }

    // Cancelled: flush what fits without waiting, then end the feed.
    while let Ok(chunk) = pending.try_recv() {
        if outbox.try_send(chunk).is_err() {
            break;
        }
    }
}

/// A catch-up-then-follow feed over one [`ByteLog`].
///
/// Dropping the subscription closes it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    log: Arc<ByteLog>,
    receiver: mpsc::Receiver<Bytes>,
    done: CancellationToken,
    closed: bool,
}

impl Subscription {
    /// Unique subscription identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Path of the log being followed.
    #[must_use]
    pub fn path(&self) -> &str {
        self.log.path()
    }

    /// Next chunk, or `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Next chunk if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }

    /// Unregisters from the log and stops the forwarding task.
    ///
    /// Safe to call while a write is being delivered and more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let registered = self.log.listeners.remove(self.id);
        self.done.cancel();
        self.receiver.close();
        debug!(
            target: STORE_TARGET,
            id = self.id,
            path = self.log.path(),
            registered,
            "stream closed"
        );
    }

    /// Whether [`Subscription::close`] has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
