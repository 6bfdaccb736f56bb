//! Bounded attribute cache with insert-only LRU semantics
//!
//! **Why**: Per-vehicle attributes (dimensions, class) and display colors
//! change slowly or never, but a naive playback loop would re-query them
//! from the store on every tick. A small fixed-capacity cache keyed by
//! vehicle id makes those lookups O(1) and bounds memory for long runs.
//!
//! **Used by**: PlaybackLoop (attribute + color caches), pipeline consumer
//! (its own private caches)
//!
//! # Insert-only policy
//!
//! `put` on an existing key refreshes the key's recency but leaves the
//! stored value UNCHANGED. This deliberately deviates from a classical LRU
//! (which would overwrite): first-seen attributes are treated as
//! authoritative so a vehicle's dimensions or color never flicker between
//! near-duplicate query results. Downstream rendering relies on this; do not
//! "correct" it to update-on-put.
//!
//! # Complexity
//!
//! Backed by the `lru` crate: O(1) get/put, O(1) move-to-front, O(1)
//! least-recent eviction.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Fixed-capacity, access-ordered cache with insert-only `put`.
///
/// Absence is reported as `None`, never as an error: callers treat a miss as
/// "not yet resolved" and fall back to the frame source.
#[derive(Debug)]
pub struct BoundedAttributeCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> BoundedAttributeCache<K, V> {
    /// Create a cache holding at most `capacity` entries (clamped to >= 1).
    pub fn new(capacity: usize) -> Self {
        // NonZeroUsize::new cannot fail after the clamp
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { inner: LruCache::new(cap) }
    }

    /// Look up `key`, marking it most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Insert `value` under `key` if absent; refresh recency either way.
    ///
    /// The existing value is never overwritten (see module docs). Inserting
    /// into a full cache evicts the least-recently-used entry.
    pub fn put(&mut self, key: K, value: V) {
        if self.inner.contains(&key) {
            self.inner.promote(&key);
        } else {
            // LruCache::push evicts the LRU entry when at capacity
            self.inner.push(key, value);
        }
    }

    /// Whether `key` is cached, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}
