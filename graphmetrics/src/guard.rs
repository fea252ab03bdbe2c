//! Bounded LRU of recently persisted operation hashes.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

pub const DEFAULT_OP_GUARD_CAPACITY: NonZeroUsize = match NonZeroUsize::new(25_000) {
    Some(v) => v,
    None => unreachable!(),
};

/// Prevents duplicate writes of the same operation document.
///
/// The guard is advisory: losing it (or evicting a hash) only costs a
/// duplicate operation insert, which the operations table tolerates because
/// it is idempotent on (hash, document).
pub struct OperationGuard {
    cache: Mutex<LruCache<String, ()>>,
}

impl OperationGuard {
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Probes for a hash, promoting its recency on a hit.
    pub fn seen(&self, hash: &str) -> bool {
        self.cache.lock().get(hash).is_some()
    }

    /// Records a hash, evicting the least recently used one when full.
    pub fn remember(&self, hash: String) {
        self.cache.lock().put(hash, ());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for OperationGuard {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_OP_GUARD_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_and_probes() {
        let guard = OperationGuard::default();
        assert!(!guard.seen("123"));

        guard.remember("123".to_string());
        assert!(guard.seen("123"));
        assert!(!guard.seen("456"));
    }

    #[test]
    fn never_exceeds_capacity() {
        let guard = OperationGuard::with_capacity(NonZeroUsize::new(3).unwrap());
        for hash in 0..10 {
            guard.remember(hash.to_string());
            assert!(guard.len() <= 3);
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let guard = OperationGuard::with_capacity(NonZeroUsize::new(2).unwrap());
        guard.remember("a".to_string());
        guard.remember("b".to_string());

        // Probing "a" promotes it, so "b" is the eviction victim.
        assert!(guard.seen("a"));
        guard.remember("c".to_string());

        assert!(guard.seen("a"));
        assert!(!guard.seen("b"));
        assert!(guard.seen("c"));
    }
}
