//! Write-ahead buffer
//!
//! Ordered deltas plus a per-key position map for reads.

use std::collections::HashMap;

use super::Delta;

/// Deltas recorded since the last commit
#[derive(Debug, Default)]
pub struct WriteAheadBuffer {
    /// Deltas in the order they were recorded
    deltas: Vec<Delta>,

    /// Key → position of its newest delta in `deltas`
    latest: HashMap<Vec<u8>, usize>,
}

impl WriteAheadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta
    pub fn record(&mut self, delta: Delta) {
        self.latest.insert(delta.key.clone(), self.deltas.len());
        self.deltas.push(delta);
    }

    /// Newest delta for `key`, if it changed since the last commit
    pub fn lookup(&self, key: &[u8]) -> Option<&Delta> {
        self.latest.get(key).map(|&pos| &self.deltas[pos])
    }

    /// Number of recorded deltas
    pub fn pending_count(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// True once `threshold` deltas are waiting, so one more would pass it
    pub fn is_full(&self, threshold: usize) -> bool {
        self.deltas.len() >= threshold
    }

    /// Take every delta in recording order, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<Delta> {
        self.latest.clear();
        std::mem::take(&mut self.deltas)
    }

    /// Discard every delta
    pub fn clear(&mut self) {
        self.deltas.clear();
        self.latest.clear();
    }

    /// Highest sequence number recorded, if any
    pub fn last_sequence(&self) -> Option<u64> {
        self.deltas.last().map(|d| d.sequence)
    }
}
