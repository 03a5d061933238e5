//! Arena-backed directory tree.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::log::ByteLog;

pub(crate) type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

#[derive(Debug)]
pub(crate) struct Directory {
    pub(crate) children: BTreeMap<String, NodeId>,
    /// Set on buffer directories; cancelled when the buffer is deleted.
    pub(crate) scope: Option<CancellationToken>,
}

impl Directory {
    pub(crate) const fn plain() -> Self {
        Self {
            children: BTreeMap::new(),
            scope: None,
        }
    }

    pub(crate) fn buffer(scope: CancellationToken) -> Self {
        Self {
            children: BTreeMap::new(),
            scope: Some(scope),
        }
    }
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Directory(Directory),
    File(Arc<ByteLog>),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) created: SystemTime,
}

impl Node {
    pub(crate) const fn as_file(&self) -> Option<&Arc<ByteLog>> {
        match &self.kind {
            NodeKind::File(log) => Some(log),
            NodeKind::Directory(_) => None,
        }
    }

    pub(crate) const fn as_directory(&self) -> Option<&Directory> {
        match &self.kind {
            NodeKind::Directory(directory) => Some(directory),
            NodeKind::File(_) => None,
        }
    }
}

/// Nodes stored in a slot vector; freed slots are reused.
#[derive(Debug)]
pub(crate) struct Tree {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let root = Node {
            name: String::new(),
            parent: None,
            kind: NodeKind::Directory(Directory::plain()),
            created: SystemTime::now(),
        };
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub(crate) fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.get(parent)?
            .as_directory()?
            .children
            .get(name)
            .copied()
    }

    pub(crate) fn lookup<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Option<NodeId> {
        segments
            .into_iter()
            .try_fold(ROOT, |node, segment| self.child(node, segment))
    }

    pub(crate) fn children(&self, parent: NodeId) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.get(parent)
            .and_then(Node::as_directory)
            .into_iter()
            .flat_map(|directory| directory.children.values())
            .filter_map(|id| self.get(*id).map(|node| (*id, node)))
    }

    /// Inserts `kind` as `name` under `parent`, which must be a directory.
    pub(crate) fn insert(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Option<NodeId> {
        let node = Node {
            name: name.to_owned(),
            parent: Some(parent),
            kind,
            created: SystemTime::now(),
        };
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let Some(NodeKind::Directory(directory)) = self
            .slots
            .get_mut(parent)
            .and_then(Option::as_mut)
            .map(|parent| &mut parent.kind)
        else {
            self.free.push(id);
            return None;
        };
        directory.children.insert(name.to_owned(), id);
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = Some(node);
        }
        Some(id)
    }

    /// Unlinks `id` and its descendants, returning the removed nodes.
    pub(crate) fn remove(&mut self, id: NodeId) -> Vec<Node> {
        if id == ROOT {
            return Vec::new();
        }
        let parent = self.get(id).and_then(|node| node.parent.map(|p| (p, node.name.clone())));
        if let Some((parent, name)) = parent
            && let Some(Some(Node {
                kind: NodeKind::Directory(directory),
                ..
            })) = self.slots.get_mut(parent)
        {
            directory.children.remove(&name);
        }

        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(node) = self.slots.get_mut(next).and_then(Option::take) else {
                continue;
            };
            if let NodeKind::Directory(directory) = &node.kind {
                pending.extend(directory.children.values().copied());
            }
            self.free.push(next);
            removed.push(node);
        }
        removed
    }

    /// Removes everything below the root.
    pub(crate) fn clear(&mut self) -> Vec<Node> {
        let top: Vec<NodeId> = self.children(ROOT).map(|(id, _)| id).collect();
        top.into_iter().flat_map(|id| self.remove(id)).collect()
    }

    /// Absolute path of `id`, e.g. `/irc/feed`.
    pub(crate) fn path_of(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut cursor = self.get(id);
        while let Some(node) = cursor {
            if node.parent.is_none() {
                break;
            }
            names.push(node.name.as_str());
            cursor = node.parent.and_then(|parent| self.get(parent));
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Every node below `id` (inclusive), depth first, with its path.
    pub(crate) fn walk(&self, id: NodeId) -> Vec<(String, NodeId)> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(node) = self.get(next) else {
                continue;
            };
            if next != ROOT {
                out.push((self.path_of(next), next));
            }
            if let Some(directory) = node.as_directory() {
                pending.extend(directory.children.values().rev().copied());
            }
        }
        out
    }

    /// Logs stored at or below `id`, with their paths.
    pub(crate) fn files_under(&self, id: NodeId) -> Vec<(String, Arc<ByteLog>)> {
        self.walk(id)
            .into_iter()
            .filter_map(|(path, node)| {
                self.get(node)
                    .and_then(Node::as_file)
                    .map(|log| (path, Arc::clone(log)))
            })
            .collect()
    }
}
