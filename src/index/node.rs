//! Index nodes and their block encoding
//!
//! ## Block Format
//! ```text
//! ┌────────┬────────────┬─────────┬──────────────────────────┐
//! │Kind (1)│ PayLen (4) │ CRC (4) │  bincode(Node) payload   │
//! └────────┴────────────┴─────────┴──────────────────────────┘
//! ```
//! The CRC covers kind, length and payload.

use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::IndexEntry;
use crate::error::{ArborError, Result};
use crate::storage::BlockPtr;

/// Tag byte that opens every index node block
pub const NODE_BLOCK_KIND: u8 = 0x4E;

/// Kind (1) + payload length (4) + CRC (4)
pub const NODE_HEADER_SIZE: usize = 9;

/// One tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Entries sorted by key
    Leaf(Vec<IndexEntry>),

    /// Children sorted by `first_key`
    Branch(Vec<ChildRef>),
}

/// Pointer from a branch to a child node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    /// Smallest key stored under this child
    pub first_key: Vec<u8>,

    pub ptr: BlockPtr,

    /// Entries stored under this child
    pub count: u64,
}

impl Node {
    pub fn first_key(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf(entries) => entries.first().map(|e| e.key.as_slice()),
            Node::Branch(children) => children.first().map(|c| c.first_key.as_slice()),
        }
    }

    /// Entries stored in this subtree
    pub fn count(&self) -> u64 {
        match self {
            Node::Leaf(entries) => entries.len() as u64,
            Node::Branch(children) => children.iter().map(|c| c.count).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Leaf(entries) => entries.is_empty(),
            Node::Branch(children) => children.is_empty(),
        }
    }
}

/// Encode a node into a checksummed block
pub fn encode_node(node: &Node) -> Result<Vec<u8>> {
    let payload = bincode::serialize(node)?;

    let mut buf = BytesMut::with_capacity(NODE_HEADER_SIZE + payload.len());
    buf.put_u8(NODE_BLOCK_KIND);
    buf.put_u32(payload.len() as u32);

    let mut hasher = Hasher::new();
    hasher.update(&buf[..5]);
    hasher.update(&payload);
    buf.put_u32(hasher.finalize());
    buf.put_slice(&payload);

    Ok(buf.to_vec())
}

/// Decode a node block
///
/// `bytes` must hold exactly one block.
pub fn decode_node(bytes: &[u8]) -> Result<Node> {
    let total = node_block_length(bytes)?;
    if bytes.len() != total {
        return Err(ArborError::Corruption(format!(
            "node block length mismatch: header says {} bytes, got {}",
            total,
            bytes.len()
        )));
    }

    let stored_crc = (&bytes[5..NODE_HEADER_SIZE]).get_u32();
    let payload = &bytes[NODE_HEADER_SIZE..];

    let mut hasher = Hasher::new();
    hasher.update(&bytes[..5]);
    hasher.update(payload);
    let computed_crc = hasher.finalize();

    if stored_crc != computed_crc {
        return Err(ArborError::Corruption(format!(
            "node checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, computed_crc
        )));
    }

    let node: Node = bincode::deserialize(payload)
        .map_err(|e| ArborError::Corruption(format!("undecodable index node: {}", e)))?;

    if node.is_empty() {
        return Err(ArborError::Corruption("empty index node".to_string()));
    }

    Ok(node)
}

/// Total length of the node block whose header starts `bytes`
pub fn node_block_length(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < NODE_HEADER_SIZE {
        return Err(ArborError::Corruption(format!(
            "truncated node header: expected {} bytes, got {}",
            NODE_HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..NODE_HEADER_SIZE];
    let kind = header.get_u8();
    if kind != NODE_BLOCK_KIND {
        return Err(ArborError::Corruption(format!(
            "not an index node block: kind {:#04x}",
            kind
        )));
    }
    let payload_len = header.get_u32() as usize;

    Ok(NODE_HEADER_SIZE + payload_len)
}
