//! The TTL cache itself.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{CacheAction, CacheConfig};

/// Entry stored in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub value: V,

    /// When this entry was inserted.
    pub stored_at: Instant,

    /// How long the entry stays observable after `stored_at`.
    pub ttl: Duration,

    /// Insertion sequence number. Breaks ties between entries stored at
    /// the same instant so eviction order is still insertion order.
    seq: u64,
}

impl<V> CacheEntry<V> {
    /// Whether the entry has aged out at `now`.
    ///
    /// An entry is observable iff `now - stored_at < ttl`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }

    /// Time since the entry was stored.
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

/// Snapshot of the cache for debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held (expired-but-unswept ones included).
    pub size: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Keys currently held, sorted.
    pub keys: Vec<String>,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
}

/// Bounded key/value cache with per-entry TTL.
///
/// Interior mutability through a short `std::sync::Mutex` critical
/// section: every operation completes without awaiting, so callers on
/// different tasks never observe a half-applied write. Share it via `Arc`.
///
/// Eviction is by insertion time (oldest `stored_at` first), NOT by last
/// access: reading an entry does not extend its life or protect it.
pub struct TtlCache<V> {
    inner: Mutex<CacheInner<V>>,
    config: CacheConfig,
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        let config = config.validated();
        debug!(
            capacity = config.capacity,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            "ttl cache created"
        );
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(config.capacity),
                next_seq: 0,
            }),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Stores `value` under `key`, observable for `ttl`.
    ///
    /// Replacing an existing key never evicts anything. Inserting a new key
    /// into a full cache first evicts the oldest entry.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.capacity {
            evict_oldest(&mut inner.entries);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                seq,
            },
        );

        trace!(
            key = %key,
            ttl_ms = ttl.as_millis() as u64,
            cache_size = inner.entries.len(),
            "cache entry stored"
        );
    }

    /// Returns the value under `key` if it hasn't expired.
    ///
    /// An expired entry is removed on the spot.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired_at(Instant::now()),
        };
        if expired {
            inner.entries.remove(key);
            trace!(key = %key, "cache entry expired on read");
            return None;
        }
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Whether a live (unexpired) entry exists under `key`. Does not
    /// remove expired entries.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(Instant::now()))
    }

    /// Removes `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        if dropped > 0 {
            debug!(dropped, "cache cleared");
        }
    }

    /// Removes every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, remaining = inner.entries.len(), "cache swept");
        }
        removed
    }

    /// Applies a [`CacheAction`] chosen by a
    /// [`VisibilityPolicy`](crate::VisibilityPolicy).
    pub fn apply(&self, action: CacheAction) {
        match action {
            CacheAction::Keep => {}
            CacheAction::Sweep => {
                self.sweep();
            }
            CacheAction::Clear => self.clear(),
        }
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Debug snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut keys: Vec<String> = inner.entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: inner.entries.len(),
            capacity: self.config.capacity,
            keys,
        }
    }
}

/// Removes the entry with the smallest `(stored_at, seq)`.
fn evict_oldest<V>(entries: &mut HashMap<String, CacheEntry<V>>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| (entry.stored_at, entry.seq))
        .map(|(key, _)| key.clone());

    if let Some(key) = oldest {
        entries.remove(&key);
        debug!(key = %key, "evicting oldest cache entry to make room");
    }
}
