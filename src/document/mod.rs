//! Document Module
//!
//! The unit of storage: a keyed record with optional metadata and body.
//!
//! ## Block Format
//! ```text
//! ┌────────┬────────┬─────────┬──────────┬──────────┬─────────┬─────────┐
//! │Kind (1)│Flags(1)│KeyLen(4)│MetaLen(4)│BodyLen(4)│ Seq (8) │ CRC (4) │
//! └────────┴────────┴─────────┴──────────┴──────────┴─────────┴─────────┘
//! ┌─────────────┬──────────────────┬──────────────────┐
//! │     Key     │     Metadata     │       Body       │
//! └─────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! The CRC covers every header byte before it plus all three regions.

mod codec;

pub use codec::{block_length, decode, encode, DOC_BLOCK_KIND, DOC_HEADER_SIZE};

/// A stored document
///
/// Empty `metadata` / `body` mean "absent". A tombstone is a document with
/// `deleted` set and empty metadata and body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub key: Vec<u8>,
    pub metadata: Vec<u8>,
    pub body: Vec<u8>,
    pub sequence: u64,
    pub deleted: bool,
}

impl Document {
    /// A live document
    pub fn new(key: &[u8], metadata: &[u8], body: &[u8], sequence: u64) -> Self {
        Self {
            key: key.to_vec(),
            metadata: metadata.to_vec(),
            body: body.to_vec(),
            sequence,
            deleted: false,
        }
    }

    /// A deletion marker for `key`
    pub fn tombstone(key: &[u8], sequence: u64) -> Self {
        Self {
            key: key.to_vec(),
            metadata: Vec::new(),
            body: Vec::new(),
            sequence,
            deleted: true,
        }
    }

    /// Size of this document once encoded
    pub fn encoded_len(&self) -> usize {
        DOC_HEADER_SIZE + self.key.len() + self.metadata.len() + self.body.len()
    }
}
