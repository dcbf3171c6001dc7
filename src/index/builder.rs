//! Bottom-up tree builder
//!
//! Builds a dense tree from entries that arrive in ascending key order,
//! writing each node once as soon as it fills up.

use std::sync::Arc;

use super::{ChildRef, IndexEntry, Node, NodeCache, NodeStore};
use crate::error::{ArborError, Result};
use crate::storage::{BlockPtr, StorageFile};

/// Streams sorted entries into a new tree
pub struct TreeBuilder {
    store: NodeStore,
    fanout: usize,

    /// Leaf being filled
    leaf: Vec<IndexEntry>,

    /// Finished nodes not yet attached to a parent, per level (0 = leaves)
    levels: Vec<Vec<ChildRef>>,

    last_key: Option<Vec<u8>>,
}

impl TreeBuilder {
    pub fn new(file: Arc<StorageFile>, cache: Arc<NodeCache>, fanout: usize) -> Self {
        Self {
            store: NodeStore::new(file, cache),
            fanout,
            leaf: Vec::with_capacity(fanout),
            levels: Vec::new(),
            last_key: None,
        }
    }

    /// Add the next entry; keys must be strictly ascending
    pub fn push(&mut self, entry: IndexEntry) -> Result<()> {
        if let Some(last) = &self.last_key {
            if entry.key <= *last {
                return Err(ArborError::InvalidArgument(format!(
                    "tree builder keys out of order: {:?} after {:?}",
                    entry.key, last
                )));
            }
        }
        self.last_key = Some(entry.key.clone());

        self.leaf.push(entry);
        if self.leaf.len() == self.fanout {
            self.flush_leaf()?;
        }
        Ok(())
    }

    /// Write the remaining nodes and return the root and entry count
    pub fn finish(mut self) -> Result<(Option<BlockPtr>, u64)> {
        if !self.leaf.is_empty() {
            self.flush_leaf()?;
        }

        let mut level = 0;
        while level < self.levels.len() {
            let refs = std::mem::take(&mut self.levels[level]);
            let is_top = level + 1 == self.levels.len();

            if is_top && refs.len() == 1 {
                return Ok((Some(refs[0].ptr), refs[0].count));
            }
            if !refs.is_empty() {
                let parent = self.store.write(Node::Branch(refs))?;
                self.push_ref(level + 1, parent)?;
            }
            level += 1;
        }

        Ok((None, 0))
    }

    fn flush_leaf(&mut self) -> Result<()> {
        let entries = std::mem::replace(&mut self.leaf, Vec::with_capacity(self.fanout));
        let leaf = self.store.write(Node::Leaf(entries))?;
        self.push_ref(0, leaf)
    }

    fn push_ref(&mut self, level: usize, child: ChildRef) -> Result<()> {
        if self.levels.len() <= level {
            self.levels.push(Vec::with_capacity(self.fanout));
        }
        self.levels[level].push(child);

        if self.levels[level].len() == self.fanout {
            let children = std::mem::replace(&mut self.levels[level], Vec::with_capacity(self.fanout));
            let parent = self.store.write(Node::Branch(children))?;
            self.push_ref(level + 1, parent)?;
        }
        Ok(())
    }
}
