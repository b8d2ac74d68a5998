//! Bounded LRU decision cache keyed by `(domain, path-prefix-or-hash,
//! error_kind)` (spec §4.3 "Caching"). A single lock with an O(1) critical
//! section, matching the concurrency model in §5.

use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};
use webdistill_types::{ErrorKind, FetchPlan};

/// Cache key: the effective host, a short hash of the URL path (so the
/// cache doesn't grow unbounded on path cardinality while still
/// distinguishing `url_regex`-driven rules), and the prior error kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub domain: String,
    pub path_hash: u64,
    pub error_kind: Option<ErrorKind>,
}

impl DecisionKey {
    pub fn new(domain: &str, path: &str, error_kind: Option<ErrorKind>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        let digest = hasher.finalize();
        let path_hash = u64::from_be_bytes(digest[0..8].try_into().unwrap());
        Self {
            domain: domain.to_string(),
            path_hash,
            error_kind,
        }
    }
}

/// Thread-safe bounded LRU mapping a [`DecisionKey`] to a previously
/// computed `FetchPlan`. Every snapshot rebuild gets a brand new cache
/// (see `RoutingSnapshot::new`), which is the "evicts on snapshot rebuild"
/// invariant: there is nothing to explicitly invalidate, the old cache is
/// simply dropped along with the old snapshot.
#[derive(Debug)]
pub struct DecisionCache {
    inner: Mutex<LruCache<DecisionKey, FetchPlan>>,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &DecisionKey) -> Option<FetchPlan> {
        let mut guard = self.inner.lock().unwrap();
        guard.get(key).cloned()
    }

    pub fn put(&self, key: DecisionKey, plan: FetchPlan) {
        let mut guard = self.inner.lock().unwrap();
        guard.put(key, plan);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = DecisionCache::new(4);
        let key = DecisionKey::new("example.com", "/a/b", None);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), FetchPlan::default());
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn distinct_error_kinds_are_distinct_keys() {
        let k1 = DecisionKey::new("example.com", "/a", None);
        let k2 = DecisionKey::new("example.com", "/a", Some(ErrorKind::NetworkTimeout));
        assert_ne!(k1, k2);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = DecisionCache::new(1);
        let k1 = DecisionKey::new("a.com", "/", None);
        let k2 = DecisionKey::new("b.com", "/", None);
        cache.put(k1.clone(), FetchPlan::default());
        cache.put(k2.clone(), FetchPlan::default());
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());
    }
}
