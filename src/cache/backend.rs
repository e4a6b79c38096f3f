//! Cache store implementations.

use super::glob::GlobPattern;
use crate::clock::{Clock, SystemClock};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Key/value store behind the response cache.
///
/// Keys passed in are fully qualified (prefix included). Implementations must
/// treat an expired entry exactly like a missing one.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Live keys matching `pattern`, in no particular order.
    async fn scan(&self, pattern: &GlobPattern) -> Result<Vec<String>>;
    /// Returns how many of `keys` were actually removed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: SystemTime,
    last_accessed: SystemTime,
}

impl StoredEntry {
    fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// In-process store with clock-driven expiry.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, StoredEntry>, now: SystemTime) {
        entries.retain(|_, e| !e.is_expired(now));
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(key) {
            self.evict_if_needed(&mut entries, now);
        }
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
        Ok(())
    }

    async fn scan(&self, pattern: &GlobPattern) -> Result<Vec<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .filter(|(k, e)| !e.is_expired(now) && pattern.matches(k))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Store that never holds anything; used when caching is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<()> {
        Ok(())
    }
    async fn scan(&self, _: &GlobPattern) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn delete(&self, _: &[String]) -> Result<u64> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
