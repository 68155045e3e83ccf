//! Process-wide query result cache.
//!
//! Maps normalized query text to the execution identifier of a prior
//! successful run, so a repeated query can skip submission entirely and
//! re-read the already-materialized output. Bounded, strict LRU.
//!
//! The key is a heuristic: case-folded, whitespace-collapsed query text.
//! Two queries that differ only inside a whitespace-sensitive string
//! literal (e.g. `'a  b'` vs `'a b'`) alias to the same entry. Entries
//! never expire based on data freshness; a hit can serve results that
//! predate mutations of the underlying tables.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::debug;

/// Case-fold and collapse consecutive whitespace so formatting variants
/// of the same query share a cache key.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub execution_id: String,
    pub inserted_at: SystemTime,
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    capacity: usize,
}

/// Bounded LRU cache of normalized query text → execution identifier.
///
/// One instance is shared across every session in the process
/// (`Arc<QueryCache>`); a mutex serializes lookups, inserts, and
/// evictions. Capacity 0 disables lookup/insert without clearing what is
/// already stored; only [`QueryCache::clear`] empties it.
pub struct QueryCache {
    inner: Mutex<Inner>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        // LruCache needs a non-zero bound; capacity 0 is handled by the
        // enabled check on every operation.
        let bound = NonZeroUsize::new(capacity.max(1)).expect("bound is at least 1");
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(bound),
                capacity,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().capacity > 0
    }

    /// Change the capacity. Growing and shrinking take effect immediately
    /// (shrinking evicts from the LRU end); setting 0 disables the cache
    /// but deliberately leaves stored entries in memory.
    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.lock();
        inner.capacity = capacity;
        if capacity > 0 {
            let bound = NonZeroUsize::new(capacity).expect("capacity is non-zero");
            inner.entries.resize(bound);
        }
    }

    /// Look up a prior execution for this query text. Touching an entry
    /// promotes it to most-recently-used.
    pub fn lookup(&self, query: &str) -> Option<String> {
        let key = normalize_query(query);
        let mut inner = self.lock();
        if inner.capacity == 0 {
            return None;
        }
        match inner.entries.get(&key) {
            Some(entry) => {
                debug!(target: "cache", execution_id = %entry.execution_id, "Query cache hit");
                Some(entry.execution_id.clone())
            }
            None => {
                debug!(target: "cache", "Query cache miss");
                None
            }
        }
    }

    /// Insert or refresh an entry. At capacity, the least-recently-used
    /// entry is evicted first. No-op while the cache is disabled.
    pub fn insert(&self, query: &str, execution_id: &str) {
        let key = normalize_query(query);
        let mut inner = self.lock();
        if inner.capacity == 0 {
            return;
        }
        debug!(target: "cache", execution_id = %execution_id, "Caching execution for reuse");
        inner.entries.put(
            key,
            CacheEntry {
                execution_id: execution_id.to_string(),
                inserted_at: SystemTime::now(),
            },
        );
    }

    /// Drop every entry. This is the only operation that empties the
    /// cache; disabling via capacity 0 does not.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        debug!(target: "cache", dropped, "Query cache cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned cache mutex means a panic mid-update; the entries are
        // just an optimization, so keep going with whatever is there.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(0)
    }
}
