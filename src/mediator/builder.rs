use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{
    CacheConfig, CacheStore, MemoryStore, NullStore, RedisStore, ResponseCache,
};
use crate::clock::Clock;
use crate::config::{CacheStoreKind, Config};
use crate::drivers::BackendAdapter;
use crate::mediator::core::Mediator;
use crate::resilience::{RetryConfig, RetryPolicy};
use crate::selector::ProviderSelector;
use crate::Result;

const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MEMORY_ENTRIES: usize = 10_000;

/// Builder for [`Mediator`].
///
/// Defaults: in-process memory cache, default retry policy, no adapters.
#[derive(Debug)]
pub struct MediatorBuilder {
    cache_config: CacheConfig,
    store: Option<Arc<dyn CacheStore>>,
    selector: ProviderSelector,
    retry: RetryConfig,
    clock: Option<Arc<dyn Clock>>,
    backend_timeout: Duration,
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self {
            cache_config: CacheConfig::default(),
            store: None,
            selector: ProviderSelector::new(),
            retry: RetryConfig::default(),
            clock: None,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Builder preloaded from `config`: the selected backend's adapter and
    /// the configured cache store.
    ///
    /// An unreachable Redis does not fail here; the connection is made
    /// lazily and its failures degrade to cache misses.
    pub fn from_config(config: &Config) -> Result<Self> {
        let selector = ProviderSelector::from_config(config)?;
        let store: Arc<dyn CacheStore> = match config.cache.store {
            CacheStoreKind::Redis => Arc::new(RedisStore::open(&config.redis_settings())?),
            CacheStoreKind::Memory => Arc::new(MemoryStore::new(config.cache.memory_max_entries)),
            CacheStoreKind::None => Arc::new(NullStore::new()),
        };
        info!(
            store = store.name(),
            ttl_secs = config.cache.ttl_secs,
            "response cache configured"
        );
        Ok(Self::new()
            .with_selector(selector)
            .with_cache_config(config.cache_config())
            .with_store(store)
            .with_retry(config.retry_config())
            .with_backend_timeout(config.backend_timeout()))
    }

    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_selector(mut self, selector: ProviderSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Registers one more adapter under its backend id.
    pub fn with_adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.selector = self.selector.with_adapter(adapter);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Clock used for retry sleeps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Upper bound for one backend call; exceeding it is a transient failure.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Mediator> {
        if self.selector.is_empty() {
            warn!("mediator built without any backend adapter");
        }
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new(DEFAULT_MEMORY_ENTRIES)));
        let mut retry = RetryPolicy::new(self.retry);
        if let Some(clock) = self.clock {
            retry = retry.with_clock(clock);
        }
        Ok(Mediator {
            cache: ResponseCache::new(self.cache_config, store),
            selector: self.selector,
            retry,
            backend_timeout: self.backend_timeout,
        })
    }
}
