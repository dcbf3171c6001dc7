//! Node store
//!
//! Reads and writes node blocks through the shared cache.

use std::sync::Arc;

use super::{decode_node, encode_node, ChildRef, Node, NodeCache};
use crate::error::{ArborError, Result};
use crate::storage::{BlockPtr, StorageFile};

/// Node I/O for one file
#[derive(Clone)]
pub struct NodeStore {
    file: Arc<StorageFile>,
    cache: Arc<NodeCache>,
}

impl NodeStore {
    pub fn new(file: Arc<StorageFile>, cache: Arc<NodeCache>) -> Self {
        Self { file, cache }
    }

    /// Load the node at `ptr`, from cache when possible
    pub fn load(&self, ptr: BlockPtr) -> Result<Arc<Node>> {
        if let Some(node) = self.cache.get(self.file.id(), ptr.offset) {
            return Ok(node);
        }

        let bytes = self.file.read(ptr.offset, ptr.length as usize)?;
        let node = Arc::new(decode_node(&bytes)?);
        self.cache.insert(self.file.id(), ptr.offset, Arc::clone(&node));
        Ok(node)
    }

    /// Append `node` to the file and return a reference to it
    pub fn write(&self, node: Node) -> Result<ChildRef> {
        let first_key = node
            .first_key()
            .map(|k| k.to_vec())
            .ok_or_else(|| ArborError::InvalidArgument("cannot write an empty node".to_string()))?;
        let count = node.count();

        let bytes = encode_node(&node)?;
        let offset = self.file.append(&bytes)?;
        let ptr = BlockPtr::new(offset, bytes.len() as u32);

        self.cache.insert(self.file.id(), offset, Arc::new(node));

        Ok(ChildRef {
            first_key,
            ptr,
            count,
        })
    }
}
