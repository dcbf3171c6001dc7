//! Node cache
//!
//! Decoded index nodes keyed by `(file id, offset)`. Node blocks are never
//! rewritten, so a cached node can never go stale.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::Node;

/// Rough size of one cached node, used to turn a byte budget into slots
const NODE_SIZE_HINT: usize = 4096;

const MIN_SLOTS: usize = 16;

/// LRU cache of decoded nodes, shared by every connection in the process
pub struct NodeCache {
    nodes: Mutex<LruCache<(u64, u64), Arc<Node>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NodeCache {
    /// Create a cache holding about `bytes` worth of nodes
    pub fn with_capacity_bytes(bytes: usize) -> Self {
        let slots = (bytes / NODE_SIZE_HINT).max(MIN_SLOTS);
        let capacity = NonZeroUsize::new(slots).unwrap_or(NonZeroUsize::MIN);
        Self {
            nodes: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, file_id: u64, offset: u64) -> Option<Arc<Node>> {
        let found = self.nodes.lock().get(&(file_id, offset)).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, file_id: u64, offset: u64, node: Arc<Node>) {
        self.nodes.lock().put((file_id, offset), node);
    }

    /// Number of cached nodes
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Max number of cached nodes
    pub fn capacity(&self) -> usize {
        self.nodes.lock().cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.nodes.lock().clear();
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes = self.nodes.lock();
        f.debug_struct("NodeCache")
            .field("len", &nodes.len())
            .field("capacity", &nodes.cap())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
