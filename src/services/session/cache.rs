//! Result cache for table pages and ad-hoc reads.
//!
//! The cache is owned by the session and only touched from the worker
//! thread, so it takes `&mut self` and needs no locking. It is never the
//! source of truth: a miss always falls through to a real query.
//!
//! Entries are dropped when:
//! - their age exceeds the TTL (checked lazily on `get`, or by `purge_expired`)
//! - the cache is full and a new key arrives (least recently accessed goes)
//! - the table they were read from is invalidated

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::query_builder::{Filters, PageWindow, Sorters};

/// Cache key.
///
/// Page keys are scoped to a table and built from the canonical JSON form of
/// the filters and sorters, so equivalent requests always collide. Statement
/// keys are not scoped to any table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    table: Option<String>,
    text: String,
}

impl CacheKey {
    /// Key for one page of a table.
    pub fn page(table: &str, window: PageWindow, filters: &Filters, sorters: &Sorters) -> Self {
        let filters = serde_json::to_string(&filters.normalized()).unwrap_or_default();
        let sorters = serde_json::to_string(sorters).unwrap_or_default();

        Self {
            table: Some(table.to_string()),
            text: format!("{}|{}|{}|{}", window.limit, window.offset, filters, sorters),
        }
    }

    /// Key for the results of an ad-hoc statement.
    pub fn statement(sql: &str) -> Self {
        Self {
            table: None,
            text: sql.trim().to_string(),
        }
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}|{}", table, self.text),
            None => write!(f, "{}", self.text),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<R> {
    value: R,
    inserted_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

/// Per-entry statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStats {
    pub key: String,
    pub access_count: u64,
    pub age_ms: u128,
}

/// Snapshot of cache health.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub entries: Vec<EntryStats>,
}

/// Bounded TTL + LRU cache.
pub struct ResultCache<R> {
    entries: HashMap<CacheKey, CacheEntry<R>>,
    capacity: usize,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl<R: Clone> ResultCache<R> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<R> {
        self.get_at(key, Instant::now())
    }

    /// Look up a key as of `now`. Expired entries are removed.
    pub fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<R> {
        let expired = match self.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.inserted_at) > self.ttl,
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.misses += 1;
            tracing::debug!(%key, "Cache entry expired");
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_count += 1;
        self.hits += 1;
        Some(entry.value.clone())
    }

    pub fn set(&mut self, key: CacheKey, value: R) {
        self.set_at(key, value, Instant::now());
    }

    /// Insert or replace a value as of `now`.
    ///
    /// When the cache is full and `key` is new, the least recently accessed
    /// entry is evicted first.
    pub fn set_at(&mut self, key: CacheKey, value: R, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_least_recent();
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed: now,
                access_count: 0,
            },
        );
    }

    fn evict_least_recent(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            tracing::debug!(%key, "Evicted least recently used cache entry");
        }
    }

    /// Drop every entry read from `table`. Returns how many were dropped.
    pub fn invalidate_table(&mut self, table: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.table() != Some(table));
        let removed = before - self.entries.len();

        if removed > 0 {
            tracing::debug!(table, removed, "Invalidated cached pages");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Sweep all entries older than the TTL as of `now`.
    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) <= ttl);
        before - self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut entries: Vec<EntryStats> = self
            .entries
            .iter()
            .map(|(key, entry)| EntryStats {
                key: key.to_string(),
                access_count: entry.access_count,
                age_ms: now.saturating_duration_since(entry.inserted_at).as_millis(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            size: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
