//! Delta definitions
//!
//! One pending index change.

use crate::index::IndexEntry;

/// A change recorded by put or delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub key: Vec<u8>,

    /// Where the document block was appended
    pub offset: u64,
    pub length: u32,

    /// Sequence number assigned to the mutation
    pub sequence: u64,

    /// True for a tombstone
    pub deleted: bool,
}

impl Delta {
    /// Index entry this delta installs, `None` for a tombstone
    pub fn to_entry(&self) -> Option<IndexEntry> {
        (!self.deleted).then(|| IndexEntry::new(self.key.clone(), self.offset, self.length, self.sequence))
    }
}
