//! Connection-tracking cache.
//!
//! Maps recently seen DCIDs to the server they decoded to. Entries remember
//! the revision of the configuration epoch that decoded them; the dispatcher
//! only honours an entry while that exact revision is still installed and
//! decodable. A miss always falls back to full decoding.

use crate::cid::{RotationTag, ServerId};
use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::debug;

/// Default number of tracked CIDs
pub const DEFAULT_CACHE_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CachedRoute {
    pub(crate) server_id: ServerId,
    pub(crate) tag: RotationTag,
    pub(crate) revision: u64,
}

/// Bounded DCID -> server map. Cleared wholesale when full.
#[derive(Debug)]
pub(crate) struct ConnectionCache {
    capacity: usize,
    entries: RwLock<AHashMap<Box<[u8]>, CachedRoute>>,
}

impl ConnectionCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(AHashMap::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY))),
        }
    }

    pub(crate) fn get(&self, cid: &[u8]) -> Option<CachedRoute> {
        self.entries.read().get(cid).copied()
    }

    pub(crate) fn insert(&self, cid: &[u8], route: CachedRoute) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity && !entries.contains_key(cid) {
            debug!(capacity = self.capacity, "connection cache full, clearing");
            entries.clear();
        }
        entries.insert(cid.into(), route);
    }

    pub(crate) fn remove(&self, cid: &[u8]) {
        self.entries.write().remove(cid);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: u64) -> CachedRoute {
        CachedRoute {
            server_id: ServerId::from_u64(id, 8),
            tag: RotationTag::new(1),
            revision: 1,
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let cache = ConnectionCache::new(8);
        cache.insert(&[0x40, 1], route(1));

        assert_eq!(cache.get(&[0x40, 1]), Some(route(1)));
        assert_eq!(cache.get(&[0x40, 2]), None);
        cache.remove(&[0x40, 1]);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_clears_when_full() {
        let cache = ConnectionCache::new(2);
        cache.insert(&[1], route(1));
        cache.insert(&[2], route(2));
        // Overwriting an existing key does not evict
        cache.insert(&[2], route(3));
        assert_eq!(cache.len(), 2);

        cache.insert(&[3], route(3));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&[3]), Some(route(3)));
    }
}
