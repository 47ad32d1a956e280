//! LRU + TTL cache for advisor verdicts.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use superego_primitives::AdvisorVerdict;

#[derive(Clone, Debug)]
struct CachedVerdict {
    verdict: AdvisorVerdict,
    inserted_at: Instant,
}

/// Bounded verdict cache keyed by the evaluation cache key.
///
/// Purely an optimization: a hit skips the upstream call, a miss never
/// changes correctness. Entries expire after the TTL even if still
/// resident.
#[derive(Debug)]
pub struct VerdictCache {
    entries: Mutex<LruCache<String, CachedVerdict>>,
    ttl: Duration,
}

impl VerdictCache {
    /// Creates a cache bounded to `capacity` entries with the given TTL.
    #[must_use]
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns the cached verdict for `key` unless it has expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<AdvisorVerdict> {
        let mut entries = self.entries.lock().expect("verdict cache poisoned");
        match entries.get(key) {
            Some(cached) if cached.inserted_at.elapsed() < self.ttl => {
                Some(cached.verdict.clone())
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Stores a verdict, evicting the least recently used entry when full.
    pub fn insert(&self, key: impl Into<String>, verdict: AdvisorVerdict) {
        let mut entries = self.entries.lock().expect("verdict cache poisoned");
        entries.put(
            key.into(),
            CachedVerdict {
                verdict,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns the number of resident entries (including not-yet-reaped
    /// expired ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("verdict cache poisoned").len()
    }

    /// Returns `true` when the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use superego_primitives::DecisionAction;

    fn verdict(reason: &str) -> AdvisorVerdict {
        AdvisorVerdict::new(DecisionAction::Allow, reason, 0.8)
    }

    fn cache(capacity: usize, ttl: Duration) -> VerdictCache {
        VerdictCache::new(NonZeroUsize::new(capacity).expect("non-zero"), ttl)
    }

    #[test]
    fn hit_and_miss() {
        let cache = cache(4, Duration::from_secs(60));
        cache.insert("k1", verdict("first"));

        assert_eq!(cache.get("k1").map(|v| v.reason), Some("first".to_owned()));
        assert!(cache.get("k2").is_none());
    }

    #[test]
    fn expired_entries_are_reaped_on_read() {
        let cache = cache(4, Duration::from_millis(10));
        cache.insert("k1", verdict("short-lived"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = cache(2, Duration::from_secs(60));
        cache.insert("a", verdict("a"));
        cache.insert("b", verdict("b"));

        // Touch `a` so `b` is the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.insert("c", verdict("c"));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }
}
