//! Expire-after-write cache of resolved mappings.
//!
//! Entries older than the TTL are treated as absent. When background refresh
//! is enabled, the first read of an entry older than the refresh threshold
//! claims it for refresh (reported as [`Lookup::Stale`]) while still serving
//! the cached value. A generation counter, bumped on every invalidation,
//! keeps loads that started before an invalidation from re-populating it.
//!
//! The store is a bounded [`quick_cache::sync::Cache`]; once full, its own
//! replacement policy decides which entries make room.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use process_plugin_core::{MappingQuery, ProcessMapping};
use quick_cache::sync::Cache;
use tokio::time::Instant;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Cached and fresh.
    Fresh(ProcessMapping),
    /// Cached but due for refresh; the caller now owns the refresh.
    Stale(ProcessMapping),
    Miss,
}

#[derive(Debug)]
struct CacheEntry {
    mapping: ProcessMapping,
    written_at: Instant,
    refreshing: AtomicBool,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    /// Entries dropped because they outlived the TTL.
    pub expirations: u64,
}

pub struct MappingCache {
    entries: Cache<MappingQuery, Arc<CacheEntry>>,
    ttl: Duration,
    refresh_after: Option<Duration>,
    capacity: usize,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    expirations: AtomicU64,
}

impl MappingCache {
    /// `refresh_after = None` disables background refresh.
    #[must_use]
    pub fn new(ttl: Duration, refresh_after: Option<Duration>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Cache::new(capacity),
            ttl,
            refresh_after,
            capacity,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Current invalidation generation. Capture it before a load and pass it
    /// to [`insert`](Self::insert).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn lookup(&self, key: &MappingQuery) -> Lookup {
        let Some(entry) = self.entries.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss;
        };

        let age = Instant::now().saturating_duration_since(entry.written_at);
        if age >= self.ttl {
            self.remove_expired(key, &entry);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        let due = self.refresh_after.is_some_and(|after| age >= after);
        if due && !entry.refreshing.swap(true, Ordering::SeqCst) {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
            return Lookup::Stale(entry.mapping.clone());
        }
        Lookup::Fresh(entry.mapping.clone())
    }

    /// Stores `mapping` unless the cache was invalidated after `generation`
    /// was taken. Returns whether the value was stored.
    pub fn insert(&self, key: MappingQuery, mapping: ProcessMapping, generation: u64) -> bool {
        if generation != self.generation() {
            self.release_refresh(&key);
            return false;
        }
        self.entries.insert(
            key,
            Arc::new(CacheEntry {
                mapping,
                written_at: Instant::now(),
                refreshing: AtomicBool::new(false),
            }),
        );
        true
    }

    /// Gives up a refresh claimed through [`Lookup::Stale`], keeping the old
    /// value until it expires or is claimed again.
    pub fn release_refresh(&self, key: &MappingQuery) {
        if let Some(entry) = self.entries.peek(key) {
            entry.refreshing.store(false, Ordering::SeqCst);
        }
    }

    /// Removes every entry whose key belongs to `tenant_id`.
    pub fn invalidate_tenant(&self, tenant_id: &str) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key.tenant_id.as_deref() != Some(tenant_id));
        before.saturating_sub(self.entries.len())
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &MappingQuery) -> bool {
        self.entries.peek(key).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Drops `expired` from the store. An entry written for `key` since the
    /// read is put back.
    fn remove_expired(&self, key: &MappingQuery, expired: &Arc<CacheEntry>) {
        if let Some((key, current)) = self.entries.remove(key) {
            if Arc::ptr_eq(&current, expired) {
                self.expirations.fetch_add(1, Ordering::Relaxed);
            } else {
                self.entries.insert(key, current);
            }
        }
    }
}

impl std::fmt::Debug for MappingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("refresh_after", &self.refresh_after)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
