//! Copy-on-write B+tree
//!
//! The persisted tree is read through [`NodeStore`]; changes collect in an
//! in-memory working copy until [`IndexTree::snapshot_root`] merges them
//! down the tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ChildRef, IndexEntry, Node, NodeCache, NodeStore};
use crate::error::Result;
use crate::storage::{BlockPtr, StorageFile};

/// A pending change: `Some` upserts, `None` removes
type Change<'a> = (&'a [u8], Option<&'a IndexEntry>);

/// Index over one file generation
pub struct IndexTree {
    store: NodeStore,

    /// Max entries per leaf / children per branch
    fanout: usize,

    /// Last persisted root
    root: Option<BlockPtr>,

    /// Entries reachable from `root`
    count: u64,

    /// Working copy: changes not yet written into the tree
    pending: BTreeMap<Vec<u8>, Option<IndexEntry>>,
}

impl IndexTree {
    /// An empty index
    pub fn new(file: Arc<StorageFile>, cache: Arc<NodeCache>, fanout: usize) -> Self {
        Self {
            store: NodeStore::new(file, cache),
            fanout,
            root: None,
            count: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Attach to a persisted root, dropping the working copy
    pub fn load_root(&mut self, root: Option<BlockPtr>, count: u64) {
        self.root = root;
        self.count = if root.is_some() { count } else { 0 };
        self.pending.clear();
    }

    /// A read-only view of the last persisted root
    pub fn snapshot(&self) -> IndexTree {
        IndexTree {
            store: self.store.clone(),
            fanout: self.fanout,
            root: self.root,
            count: self.count,
            pending: BTreeMap::new(),
        }
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Find the entry for `key`, checking the working copy first
    pub fn lookup(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        if let Some(change) = self.pending.get(key) {
            return Ok(change.clone());
        }
        self.lookup_persisted(key)
    }

    /// Insert or replace the entry for `entry.key`
    pub fn upsert(&mut self, entry: IndexEntry) {
        self.pending.insert(entry.key.clone(), Some(entry));
    }

    /// Drop the entry for `key`, if any
    pub fn remove(&mut self, key: &[u8]) {
        self.pending.insert(key.to_vec(), None);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the working copy into the tree and return the new root
    ///
    /// Only nodes on changed paths are rewritten. On error the working copy
    /// and the previous root are left as they were.
    pub fn snapshot_root(&mut self) -> Result<Option<BlockPtr>> {
        if self.pending.is_empty() {
            return Ok(self.root);
        }

        let changes: Vec<Change<'_>> = self
            .pending
            .iter()
            .map(|(key, change)| (key.as_slice(), change.as_ref()))
            .collect();

        let level = match self.root {
            Some(root) => {
                let node = self.store.load(root)?;
                let first_key = node.first_key().map(|k| k.to_vec()).unwrap_or_default();
                let root_ref = ChildRef {
                    first_key,
                    ptr: root,
                    count: self.count,
                };
                self.apply(&root_ref, &changes)?
            }
            None => {
                let entries = changes
                    .iter()
                    .filter_map(|(_, change)| change.cloned())
                    .collect();
                self.write_leaves(entries)?
            }
        };

        let (root, count) = self.finish_levels(level)?;

        self.root = root;
        self.count = count;
        self.pending.clear();

        Ok(root)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Last persisted root
    pub fn root(&self) -> Option<BlockPtr> {
        self.root
    }

    /// Entries reachable from the persisted root
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Changes waiting in the working copy
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Walk the persisted entries in key order
    pub fn iter(&self) -> TreeIter {
        TreeIter {
            store: self.store.clone(),
            root: self.root,
            stack: Vec::new(),
        }
    }

    /// Height of the persisted tree (0 when empty)
    pub fn depth(&self) -> Result<usize> {
        let mut depth = 0;
        let mut next = self.root;
        while let Some(ptr) = next {
            depth += 1;
            next = match &*self.store.load(ptr)? {
                Node::Leaf(_) => None,
                Node::Branch(children) => children.first().map(|c| c.ptr),
            };
        }
        Ok(depth)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn lookup_persisted(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let mut ptr = match self.root {
            Some(root) => root,
            None => return Ok(None),
        };

        loop {
            let node = self.store.load(ptr)?;
            match &*node {
                Node::Leaf(entries) => {
                    let found = entries
                        .binary_search_by(|e| e.key.as_slice().cmp(key))
                        .ok()
                        .map(|i| entries[i].clone());
                    return Ok(found);
                }
                Node::Branch(children) => {
                    ptr = children[child_index(children, key)].ptr;
                }
            }
        }
    }

    /// Apply sorted `changes` to the subtree under `child`
    ///
    /// Returns the references that replace `child` in its parent: none if
    /// the subtree emptied, several if it split, `child` itself if nothing
    /// changed.
    fn apply(&self, child: &ChildRef, changes: &[Change<'_>]) -> Result<Vec<ChildRef>> {
        let node = self.store.load(child.ptr)?;

        match &*node {
            Node::Leaf(entries) => {
                let merged = merge_entries(entries, changes);
                if merged == *entries {
                    return Ok(vec![child.clone()]);
                }
                self.write_leaves(merged)
            }
            Node::Branch(children) => {
                let mut replaced = Vec::with_capacity(children.len() + 1);
                let mut rest = changes;

                for (i, grandchild) in children.iter().enumerate() {
                    let take = match children.get(i + 1) {
                        Some(next) => rest.partition_point(|(k, _)| *k < next.first_key.as_slice()),
                        None => rest.len(),
                    };
                    let (mine, tail) = rest.split_at(take);
                    rest = tail;

                    if mine.is_empty() {
                        replaced.push(grandchild.clone());
                    } else {
                        replaced.extend(self.apply(grandchild, mine)?);
                    }
                }

                if replaced == *children {
                    return Ok(vec![child.clone()]);
                }
                self.write_branches(replaced)
            }
        }
    }

    fn write_leaves(&self, entries: Vec<IndexEntry>) -> Result<Vec<ChildRef>> {
        balanced_chunks(entries, self.fanout)
            .into_iter()
            .map(|chunk| self.store.write(Node::Leaf(chunk)))
            .collect()
    }

    fn write_branches(&self, children: Vec<ChildRef>) -> Result<Vec<ChildRef>> {
        balanced_chunks(children, self.fanout)
            .into_iter()
            .map(|chunk| self.store.write(Node::Branch(chunk)))
            .collect()
    }

    /// Stack branch levels until a single root remains
    fn finish_levels(&self, mut level: Vec<ChildRef>) -> Result<(Option<BlockPtr>, u64)> {
        loop {
            match level.len() {
                0 => return Ok((None, 0)),
                1 => break,
                _ => level = self.write_branches(level)?,
            }
        }

        let mut root = level.remove(0);

        // A branch with one child adds a level and nothing else
        loop {
            let node = self.store.load(root.ptr)?;
            match &*node {
                Node::Branch(children) if children.len() == 1 => root = children[0].clone(),
                _ => break,
            }
        }

        Ok((Some(root.ptr), root.count))
    }
}

impl std::fmt::Debug for IndexTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexTree")
            .field("root", &self.root)
            .field("count", &self.count)
            .field("pending", &self.pending.len())
            .field("fanout", &self.fanout)
            .finish()
    }
}

/// Child of a branch whose range covers `key`
fn child_index(children: &[ChildRef], key: &[u8]) -> usize {
    children
        .partition_point(|c| c.first_key.as_slice() <= key)
        .saturating_sub(1)
}

/// Merge sorted changes into sorted entries
fn merge_entries(entries: &[IndexEntry], changes: &[Change<'_>]) -> Vec<IndexEntry> {
    let mut merged = Vec::with_capacity(entries.len() + changes.len());
    let mut i = 0;

    for (key, change) in changes {
        while i < entries.len() && entries[i].key.as_slice() < *key {
            merged.push(entries[i].clone());
            i += 1;
        }
        if i < entries.len() && entries[i].key.as_slice() == *key {
            i += 1;
        }
        if let Some(entry) = change {
            merged.push((*entry).clone());
        }
    }

    merged.extend_from_slice(&entries[i..]);
    merged
}

/// Split `items` into the fewest chunks of at most `max` items, sized evenly
fn balanced_chunks<T>(items: Vec<T>, max: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }

    let chunk_count = items.len().div_ceil(max);
    let base = items.len() / chunk_count;
    let extra = items.len() % chunk_count;

    let mut chunks = Vec::with_capacity(chunk_count);
    let mut iter = items.into_iter();
    for i in 0..chunk_count {
        let size = base + usize::from(i < extra);
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

// =============================================================================
// Iteration
// =============================================================================

/// In-order walk over a persisted tree
pub struct TreeIter {
    store: NodeStore,

    /// Root still to be loaded on the first call
    root: Option<BlockPtr>,

    /// Path from the root to the current node, with the next slot in each
    stack: Vec<(Arc<Node>, usize)>,
}

enum Step {
    Yield(IndexEntry),
    Descend(BlockPtr),
    Ascend,
}

impl Iterator for TreeIter {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            match self.store.load(root) {
                Ok(node) => self.stack.push((node, 0)),
                Err(e) => return Some(Err(e)),
            }
        }

        loop {
            let step = {
                let (node, pos) = self.stack.last_mut()?;
                let slot = *pos;
                *pos += 1;
                match &**node {
                    Node::Leaf(entries) => match entries.get(slot) {
                        Some(entry) => Step::Yield(entry.clone()),
                        None => Step::Ascend,
                    },
                    Node::Branch(children) => match children.get(slot) {
                        Some(child) => Step::Descend(child.ptr),
                        None => Step::Ascend,
                    },
                }
            };

            match step {
                Step::Yield(entry) => return Some(Ok(entry)),
                Step::Ascend => {
                    self.stack.pop();
                }
                Step::Descend(ptr) => match self.store.load(ptr) {
                    Ok(child) => self.stack.push((child, 0)),
                    Err(e) => {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                },
            }
        }
    }
}
