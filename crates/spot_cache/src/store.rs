//! Shared TTL cache.
//!
//! A single `RwLock` guards the whole map: lookups share the read lock,
//! every mutation (including the background sweep) takes the write lock.
//! Critical sections are plain map operations and never span an await.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Type-erased cached value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct CacheEntry {
    value: CacheValue,
    created_at: DateTime<Utc>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: CacheValue, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Utc::now(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub items: usize,
    pub oldest_item: Option<DateTime<Utc>>,
    pub last_clear: Option<DateTime<Utc>>,
    pub ttl_secs: u64,
}

/// Key/value store with per-entry expiry and hit/miss counters.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Bumped by every `delete_prefix` and `clear`.
    generation: AtomicU64,
    last_clear: RwLock<Option<DateTime<Utc>>>,
}

impl TtlCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            last_clear: RwLock::new(None),
        }
    }

    /// Store-wide default TTL used by `set_default`.
    pub fn ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Invalidation generation. Capture it before an upstream fetch and
    /// store the result with `set_if_generation`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // ── Reads ─────────────────────────────────────────────────────────

    /// Live value for `key`. Expired entries count as misses and are left
    /// for the sweeper.
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        let found = self
            .read_entries()
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.value.clone());
        self.record(found.is_some());
        found
    }

    /// Typed lookup. A value of another type counts as a miss.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let found = self.peek_as::<T>(key);
        self.record(found.is_some());
        found
    }

    /// Typed lookup that leaves the hit/miss counters untouched.
    pub fn peek_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.read_entries()
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .and_then(|e| e.value.clone().downcast::<T>().ok())
    }

    /// Keys of all live entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .read_entries()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.read_entries();
        let live = entries.values().filter(|e| !e.is_expired(now));
        let (items, oldest_item) = live.fold((0usize, None), |(n, oldest), e| {
            let oldest = match oldest {
                Some(o) if o <= e.created_at => Some(o),
                _ => Some(e.created_at),
            };
            (n + 1, oldest)
        });

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            items,
            oldest_item,
            last_clear: *self.last_clear.read().unwrap_or_else(PoisonError::into_inner),
            ttl_secs: self.default_ttl.as_secs(),
        }
    }

    // ── Writes ────────────────────────────────────────────────────────

    /// Insert or replace `key`.
    pub fn set(&self, key: impl Into<String>, value: CacheValue, ttl: Duration) {
        self.write_entries()
            .insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Insert `key` unless the store was invalidated since `generation` was
    /// read. Returns whether the value was stored.
    pub fn set_if_generation(
        &self,
        key: impl Into<String>,
        value: CacheValue,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        let mut entries = self.write_entries();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.insert(key.into(), CacheEntry::new(value, ttl));
        true
    }

    pub fn set_default(&self, key: impl Into<String>, value: CacheValue) {
        self.set(key, value, self.default_ttl);
    }

    /// Returns true if an entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.write_entries().remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`; returns the count.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.write_entries();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before - entries.len();
        debug!(prefix, removed, "cache prefix invalidated");
        removed
    }

    /// Drop everything; returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.write_entries();
            self.generation.fetch_add(1, Ordering::AcqRel);
            let n = entries.len();
            entries.clear();
            n
        };
        *self.last_clear.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        removed
    }

    /// Physically remove expired entries; returns the count.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write_entries();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Run `purge_expired` every `every` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else { break };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, "cache sweep reclaimed expired entries");
                }
            }
        })
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("items", &self.read_entries().len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
