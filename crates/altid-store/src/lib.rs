//! In-memory storage behind an Altid service's synthetic files.
//!
//! The store is a tree of buffers. Each buffer is a directory of
//! [`ByteLog`]s such as `feed`, `title` and `status`, and the root also holds
//! session-level files like `ctl`, `tabs` and `errors`. Clients open files
//! through [`BufferStore::open`] and get a [`FileHandle`] with its own cursor,
//! or follow a file through [`BufferStore::stream`], which yields a
//! [`Subscription`] that replays existing contents and then every later write.
//!
//! Streams are fanned out by the log itself: writers never wait for slow
//! subscribers, and a buffer with live streams cannot be deleted until those
//! streams close.

mod backing;
mod error;
mod handle;
mod listing;
mod log;
mod store;
mod stream;
mod tree;

pub use error::{Result, StoreError};
pub use handle::FileHandle;
pub use listing::{DirEntry, RootListing};
pub use log::{ByteLog, INITIAL_CAPACITY, ReadOutcome};
pub use store::{BUFFER_FILES, BufferStore, ContentKind, SESSION_FILES, WELCOME};
pub use stream::{StreamBroker, Subscription};

pub(crate) const STORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::store");
