//! Response cache handle: key prefixing, TTL, operation timeouts and stats.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::backend::CacheStore;
use super::glob::GlobPattern;
use super::key::Fingerprint;
use crate::{Error, Result};

pub const DEFAULT_KEY_PREFIX: &str = "bug-oracle:llm";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub enabled: bool,
    pub key_prefix: String,
    /// Upper bound on any single store call.
    pub op_timeout: Duration,
    /// Responses larger than this are not stored.
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(7 * 24 * 3600),
            enabled: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            op_timeout: Duration::from_secs(2),
            max_entry_size: 10 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Fingerprint-keyed response cache over a pluggable [`CacheStore`].
///
/// Every store call is bounded by `op_timeout`; a timeout surfaces as
/// [`Error::CacheUnavailable`] just like a connection failure.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    stats: Arc<AtomicStats>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            config,
            store,
            stats: Arc::new(AtomicStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fully qualified store key for a fingerprint.
    pub fn key_for(&self, fingerprint: &Fingerprint) -> String {
        if self.config.key_prefix.is_empty() {
            fingerprint.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, fingerprint)
        }
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let result = match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(Error::cache_unavailable(
                self.store.name(),
                format!(
                    "{} timed out after {}ms",
                    op,
                    self.config.op_timeout.as_millis()
                ),
            )),
        };
        if result.is_err() {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let key = self.key_for(fingerprint);
        let value = self.bounded("get", self.store.get(&key)).await?;
        match value {
            Some(_) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss");
            }
        }
        Ok(value)
    }

    pub async fn set(&self, fingerprint: &Fingerprint, value: &str) -> Result<()> {
        self.set_with_ttl(fingerprint, value, self.config.default_ttl)
            .await
    }

    pub async fn set_with_ttl(
        &self,
        fingerprint: &Fingerprint,
        value: &str,
        ttl: Duration,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if value.len() > self.config.max_entry_size {
            debug!(size = value.len(), "response too large to cache");
            return Ok(());
        }
        let key = self.key_for(fingerprint);
        self.bounded("set", self.store.set(&key, value, ttl)).await?;
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stored keys matching a glob `pattern`, sorted.
    pub async fn find_by_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = GlobPattern::new(pattern)?;
        let mut keys = self.bounded("scan", self.store.scan(&pattern)).await?;
        keys.sort();
        Ok(keys)
    }

    /// Deletes every stored key matching `pattern`; returns how many went.
    pub async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let keys = self.find_by_pattern(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded("delete", self.store.delete(&keys)).await
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }
}
