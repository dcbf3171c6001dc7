//! Index Module
//!
//! Ordered map from document key to the location of its latest version.
//!
//! ## Responsibilities
//! - Point lookups by raw-byte key order
//! - Buffer upserts/removes in a working copy
//! - Persist the working copy as copy-on-write B+tree nodes
//! - Bottom-up tree building for compaction
//!
//! ## Structure
//! Every committed root is an immutable snapshot. A commit only rewrites the
//! nodes on the paths it touched; every other subtree is reused by pointer,
//! so older roots stay valid and readable.
//!
//! ```text
//!   root v1          root v2
//!      │                │
//!   ┌──┴──┐          ┌──┴──┐
//!   A     B ◄────────┤     B'
//!                          (only B was rewritten)
//! ```

mod builder;
mod cache;
mod node;
mod store;
mod tree;

use serde::{Deserialize, Serialize};

pub use builder::TreeBuilder;
pub use cache::NodeCache;
pub use node::{decode_node, encode_node, node_block_length, ChildRef, Node, NODE_BLOCK_KIND, NODE_HEADER_SIZE};
pub use store::NodeStore;
pub use tree::{IndexTree, TreeIter};

/// Location of the latest version of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub offset: u64,
    pub length: u32,
    pub sequence: u64,
}

impl IndexEntry {
    pub fn new(key: Vec<u8>, offset: u64, length: u32, sequence: u64) -> Self {
        Self {
            key,
            offset,
            length,
            sequence,
        }
    }
}
