//! Latest extraction result per caller.
//!
//! Advisory state only: concurrent writes under the same key are
//! last-write-wins. Bounded by capacity (oldest entry evicted first) and
//! by a time-to-live checked on every access.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config;
use crate::pipeline::events::ExtractionResult;

/// A cached result and when it was stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResult {
    pub result: ExtractionResult,
    pub stored_at: DateTime<Utc>,
}

struct Entry {
    cached: CachedResult,
    inserted: Instant,
}

pub struct ResultCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, Entry>,
}

impl ResultCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, caller: &str, result: ExtractionResult) {
        self.insert_at(caller, result, Instant::now());
    }

    pub fn get(&mut self, caller: &str) -> Option<CachedResult> {
        self.get_at(caller, Instant::now())
    }

    /// Store `result` for `caller`, replacing any previous entry.
    pub fn insert_at(&mut self, caller: &str, result: ExtractionResult, now: Instant) {
        self.purge_expired(now);

        if !self.entries.contains_key(caller) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.entries.insert(
            caller.to_string(),
            Entry {
                cached: CachedResult {
                    result,
                    stored_at: Utc::now(),
                },
                inserted: now,
            },
        );
    }

    /// Latest result for `caller`, unless it has expired.
    pub fn get_at(&mut self, caller: &str, now: Instant) -> Option<CachedResult> {
        let expired = self
            .entries
            .get(caller)
            .map(|entry| self.is_expired(entry, now))?;
        if expired {
            self.entries.remove(caller);
            return None;
        }
        self.entries.get(caller).map(|entry| entry.cached.clone())
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted) < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Expired cached results purged");
        }
        removed
    }

    pub fn remove(&mut self, caller: &str) -> bool {
        self.entries.remove(caller).is_some()
    }

    pub fn clear(&mut self) {
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

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted) >= self.ttl
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            tracing::debug!(capacity = self.capacity, "Result cache full, oldest entry evicted");
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(
            config::DEFAULT_CACHE_CAPACITY,
            Duration::from_secs(config::DEFAULT_CACHE_TTL_SECS),
        )
    }
}
