//! The per-service buffer store.

use std::sync::Arc;

use altid_config::Config;
use camino::Utf8PathBuf;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::STORE_TARGET;
use crate::backing::BackingFile;
use crate::error::{Result, StoreError};
use crate::handle::FileHandle;
use crate::listing::{DirEntry, RootListing};
use crate::log::ByteLog;
use crate::stream::{StreamBroker, Subscription};
use crate::tree::{Directory, Node, NodeId, NodeKind, ROOT, Tree};

/// Text every new buffer's content file starts with.
pub const WELCOME: &[u8] = b"Welcome!\n";

/// Files created alongside the content file in every buffer.
pub const BUFFER_FILES: [&str; 6] = ["status", "title", "aside", "navi", "input", "notification"];

/// Session-level files created by the control session.
pub const SESSION_FILES: [&str; 5] = ["ctl", "tabs", "errors", "event", "notification"];

/// Name of a buffer's primary content file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentKind {
    /// Append-only chat feed, `feed`.
    #[default]
    Feed,
    /// Document-style content, `main`.
    Main,
}

impl ContentKind {
    /// File name of the content file.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Main => "main",
        }
    }
}

/// A tree of buffers, each a directory of [`ByteLog`]s.
#[derive(Debug)]
pub struct BufferStore {
    tree: RwLock<Tree>,
    broker: StreamBroker,
    scope: CancellationToken,
    log_dir: Option<Utf8PathBuf>,
    listing_capacity: usize,
    content: ContentKind,
}

impl BufferStore {
    /// Builds an empty store whose streams end when `scope` is cancelled.
    #[must_use]
    pub fn new(config: &Config, scope: CancellationToken) -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            broker: StreamBroker::new(config.stream_queue()),
            scope,
            log_dir: config.log_dir().map(ToOwned::to_owned),
            listing_capacity: config.listing_page(),
            content: ContentKind::default(),
        }
    }

    /// Uses `content` as the content file of buffers created from now on.
    #[must_use]
    pub fn with_content(mut self, content: ContentKind) -> Self {
        self.content = content;
        self
    }

    /// Content file kind for new buffers.
    #[must_use]
    pub const fn content(&self) -> ContentKind {
        self.content
    }

    /// Root cancellation scope of the store.
    #[must_use]
    pub const fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Opens `path`, creating the file on first reference.
    ///
    /// Directories below an existing buffer are created as needed; a path
    /// into a buffer that does not exist fails with
    /// [`StoreError::BufferNotFound`].
    pub fn open(&self, path: &str) -> Result<FileHandle> {
        let segments = split_path(path)?;
        {
            let tree = self.tree.read();
            if let Some(id) = tree.lookup(segments.iter().copied()) {
                return file_at(&tree, id, path).map(|log| FileHandle::new(Arc::clone(log)));
            }
        }

        let mut tree = self.tree.write();
        let Some((last, parents)) = segments.split_last() else {
            return Err(StoreError::invalid_path(path));
        };
        let mut parent = ROOT;
        for (depth, segment) in parents.iter().enumerate() {
            parent = match tree.child(parent, segment) {
                Some(child) => child,
                None if depth == 0 => return Err(StoreError::missing_buffer(*segment)),
                None => tree
                    .insert(parent, segment, NodeKind::Directory(Directory::plain()))
                    .ok_or_else(|| StoreError::not_found(path))?,
            };
        }
        if let Some(existing) = tree.child(parent, last) {
            return file_at(&tree, existing, path).map(|log| FileHandle::new(Arc::clone(log)));
        }

        let log = Arc::new(ByteLog::new(canonical(&segments)));
        tree.insert(parent, last, NodeKind::File(Arc::clone(&log)))
            .ok_or_else(|| StoreError::not_found(path))?;
        debug!(target: STORE_TARGET, path = log.path(), "file created");
        Ok(FileHandle::new(log))
    }

    /// Creates `name` with its default files.
    pub fn create_buffer(&self, name: &str) -> Result<()> {
        validate_segment(name)?;
        if self.tree.read().child(ROOT, name).is_some() {
            return Err(StoreError::DuplicateBuffer {
                name: name.to_owned(),
            });
        }
        let content_path = format!("/{name}/{}", self.content.file_name());
        let content = match &self.log_dir {
            Some(dir) => {
                let (backing, mut history) = BackingFile::open(dir, name)?;
                history.extend_from_slice(WELCOME);
                ByteLog::backed(content_path, history, backing)
            }
            None => ByteLog::with_contents(content_path, WELCOME.to_vec()),
        };

        let mut tree = self.tree.write();
        if tree.child(ROOT, name).is_some() {
            return Err(StoreError::DuplicateBuffer {
                name: name.to_owned(),
            });
        }
        let scope = self.scope.child_token();
        let buffer = tree
            .insert(ROOT, name, NodeKind::Directory(Directory::buffer(scope)))
            .ok_or_else(|| StoreError::invalid_path(name))?;
        tree.insert(buffer, self.content.file_name(), NodeKind::File(Arc::new(content)));
        for file in BUFFER_FILES {
            let log = ByteLog::new(format!("/{name}/{file}"));
            tree.insert(buffer, file, NodeKind::File(Arc::new(log)));
        }
        info!(target: STORE_TARGET, buffer = name, backed = self.log_dir.is_some(), "buffer created");
        Ok(())
    }

    /// Creates `name` unless it already exists; reports whether it was created.
    pub fn ensure_buffer(&self, name: &str) -> Result<bool> {
        if self.has_buffer(name) {
            return Ok(false);
        }
        self.create_buffer(name).map(|()| true)
    }

    /// Removes `name` and everything in it.
    ///
    /// Refuses with [`StoreError::ActiveStreamOnDelete`] while any file in the
    /// buffer is being streamed.
    pub fn delete_buffer(&self, name: &str) -> Result<()> {
        let removed = {
            let mut tree = self.tree.write();
            let id = buffer_id(&tree, name)?;
            ensure_not_streamed(&tree, id)?;
            tree.remove(id)
        };
        release(removed);
        info!(target: STORE_TARGET, buffer = name, "buffer deleted");
        Ok(())
    }

    /// Ends every stream in `name` and removes the buffer in one step.
    ///
    /// Unlike [`Self::delete_buffer`] this never refuses: the tree stays
    /// locked from detaching to removal, so no new stream can attach in
    /// between. Returns how many streams were ended.
    pub fn close_buffer(&self, name: &str) -> Result<usize> {
        let (detached, removed) = {
            let mut tree = self.tree.write();
            let id = buffer_id(&tree, name)?;
            let detached = tree
                .files_under(id)
                .iter()
                .map(|(_, log)| log.detach_subscribers())
                .sum::<usize>();
            (detached, tree.remove(id))
        };
        release(removed);
        info!(target: STORE_TARGET, buffer = name, detached, "buffer closed");
        Ok(detached)
    }

    /// Removes a single file, refusing while it is being streamed.
    pub fn remove(&self, path: &str) -> Result<()> {
        let segments = split_path(path)?;
        let removed = {
            let mut tree = self.tree.write();
            let id = tree
                .lookup(segments.iter().copied())
                .ok_or_else(|| StoreError::not_found(path))?;
            file_at(&tree, id, path)?;
            ensure_not_streamed(&tree, id)?;
            tree.remove(id)
        };
        release(removed);
        debug!(target: STORE_TARGET, path, "file removed");
        Ok(())
    }

    /// Whether a buffer called `name` exists.
    #[must_use]
    pub fn has_buffer(&self, name: &str) -> bool {
        let tree = self.tree.read();
        buffer_id(&tree, name).is_ok()
    }

    /// Names of all buffers.
    #[must_use]
    pub fn buffers(&self) -> Vec<String> {
        let tree = self.tree.read();
        tree.children(ROOT)
            .filter(|(_, node)| node.as_directory().is_some())
            .map(|(_, node)| node.name.clone())
            .collect()
    }

    /// Every live path, directories included.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let tree = self.tree.read();
        tree.walk(ROOT).into_iter().map(|(path, _)| path).collect()
    }

    /// Metadata for `path`.
    pub fn stat(&self, path: &str) -> Result<DirEntry> {
        let segments = split_path(path)?;
        let tree = self.tree.read();
        let id = tree
            .lookup(segments.iter().copied())
            .ok_or_else(|| StoreError::not_found(path))?;
        entry_for(&tree, id).ok_or_else(|| StoreError::not_found(path))
    }

    /// Listing of `buffer` plus the session-level files at the root.
    ///
    /// Entries arrive through [`RootListing::readdir`]. Fails with
    /// [`StoreError::NoRuntime`] outside a Tokio runtime.
    pub fn root(&self, buffer: &str) -> Result<RootListing> {
        let entries = {
            let tree = self.tree.read();
            let id = buffer_id(&tree, buffer)?;
            let session = tree
                .children(ROOT)
                .filter(|(_, node)| node.as_file().is_some())
                .map(|(id, _)| id);
            let own = tree.children(id).map(|(id, _)| id);
            session
                .chain(own)
                .filter_map(|id| entry_for(&tree, id))
                .collect::<Vec<_>>()
        };
        RootListing::spawn(entries, self.listing_capacity, self.scope.child_token())
    }

    /// Follows `path`: existing contents first, then every later write.
    ///
    /// Fails with [`StoreError::NoRuntime`] outside a Tokio runtime.
    pub fn stream(&self, path: &str) -> Result<Subscription> {
        let segments = split_path(path)?;
        let (log, scope) = {
            let tree = self.tree.read();
            let id = tree
                .lookup(segments.iter().copied())
                .ok_or_else(|| StoreError::not_found(path))?;
            let log = Arc::clone(file_at(&tree, id, path)?);
            let scope = segments
                .first()
                .and_then(|buffer| buffer_id(&tree, buffer).ok())
                .and_then(|buffer| tree.get(buffer))
                .and_then(Node::as_directory)
                .and_then(|directory| directory.scope.clone())
                .unwrap_or_else(|| self.scope.clone());
            (log, scope)
        };
        self.broker.subscribe(&log, &scope)
    }

    /// Detaches every stream on files in `name`; each feed drains then ends.
    pub fn detach_streams(&self, name: &str) -> Result<usize> {
        let tree = self.tree.read();
        let id = buffer_id(&tree, name)?;
        Ok(tree
            .files_under(id)
            .iter()
            .map(|(_, log)| log.detach_subscribers())
            .sum())
    }

    /// Drops every buffer and file, ending all streams.
    pub fn teardown(&self) {
        let removed = self.tree.write().clear();
        for node in &removed {
            if let Some(log) = node.as_file() {
                log.detach_subscribers();
            }
        }
        let count = removed.len();
        release(removed);
        info!(target: STORE_TARGET, nodes = count, "store torn down");
    }
}

fn release(removed: Vec<Node>) {
    for node in removed {
        match node.kind {
            NodeKind::File(log) => log.close(),
            NodeKind::Directory(Directory {
                scope: Some(scope), ..
            }) => scope.cancel(),
            NodeKind::Directory(_) => {}
        }
    }
}

fn buffer_id(tree: &Tree, name: &str) -> Result<NodeId> {
    tree.child(ROOT, name)
        .filter(|id| tree.get(*id).and_then(Node::as_directory).is_some())
        .ok_or_else(|| StoreError::missing_buffer(name))
}

fn file_at<'t>(tree: &'t Tree, id: NodeId, path: &str) -> Result<&'t Arc<ByteLog>> {
    let node = tree.get(id).ok_or_else(|| StoreError::not_found(path))?;
    node.as_file().ok_or_else(|| StoreError::NotAFile {
        path: path.to_owned(),
    })
}

fn ensure_not_streamed(tree: &Tree, id: NodeId) -> Result<()> {
    for (path, log) in tree.files_under(id) {
        let subscribers = log.subscriber_count();
        if subscribers > 0 {
            return Err(StoreError::ActiveStreamOnDelete { path, subscribers });
        }
    }
    Ok(())
}

fn entry_for(tree: &Tree, id: NodeId) -> Option<DirEntry> {
    let node = tree.get(id)?;
    let path = tree.path_of(id);
    Some(match &node.kind {
        NodeKind::File(log) => DirEntry {
            name: node.name.clone(),
            path,
            is_dir: false,
            len: log.len().unwrap_or_default(),
            modified: log.modified(),
        },
        NodeKind::Directory(_) => DirEntry {
            name: node.name.clone(),
            path,
            is_dir: true,
            len: 0,
            modified: node.created,
        },
    })
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    if segments.is_empty() || segments.iter().any(|segment| matches!(*segment, "." | "..")) {
        return Err(StoreError::invalid_path(path));
    }
    Ok(segments)
}

fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || matches!(name, "." | "..") {
        return Err(StoreError::invalid_path(name));
    }
    Ok(())
}

fn canonical(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
