use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{fingerprint, CacheStats, ResponseCache};
use crate::config::Config;
use crate::drivers::BackendAdapter;
use crate::error::FailureClass;
use crate::resilience::RetryPolicy;
use crate::selector::ProviderSelector;
use crate::types::{Prompt, Request};
use crate::{Error, Result};

/// Single entry point for LLM calls.
///
/// Holds no lock of its own; share it behind an `Arc`. Two concurrent
/// misses for the same request both reach the backend and the later cache
/// write wins.
#[derive(Debug)]
pub struct Mediator {
    pub(crate) cache: ResponseCache,
    pub(crate) selector: ProviderSelector,
    pub(crate) retry: RetryPolicy,
    pub(crate) backend_timeout: Duration,
}

impl Mediator {
    pub fn builder() -> crate::mediator::MediatorBuilder {
        crate::mediator::MediatorBuilder::new()
    }

    /// Mediator for the configured backend and cache store.
    pub fn from_config(config: &Config) -> Result<Self> {
        crate::mediator::MediatorBuilder::from_config(config)?.build()
    }

    /// Returns the text for `request`, from the cache when possible.
    ///
    /// Cache failures never fail the call. Backend failures that survive the
    /// retry policy are returned and nothing is cached.
    pub async fn invoke(&self, request: &Request) -> Result<String> {
        let invocation_id = Uuid::new_v4();
        let key = fingerprint(request);

        match self.cache.get(&key).await {
            Ok(Some(text)) => {
                debug!(
                    %invocation_id,
                    backend_id = request.backend_id(),
                    model_id = request.model_id(),
                    key = %key,
                    "served from cache"
                );
                return Ok(text);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(%invocation_id, key = %key, error = %e, "cache lookup failed, calling backend");
            }
        }

        let adapter = self.selector.resolve(request.backend_id())?;
        let prompt = request.prompt();
        let started = Instant::now();
        let text = self
            .retry
            .run(|attempt| self.call_backend(adapter.as_ref(), &prompt, attempt))
            .await
            .map_err(|e| {
                info!(
                    %invocation_id,
                    backend_id = request.backend_id(),
                    model_id = request.model_id(),
                    failure = e.kind(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "request failed"
                );
                e
            })?;

        info!(
            %invocation_id,
            backend_id = request.backend_id(),
            model_id = request.model_id(),
            duration_ms = started.elapsed().as_millis() as u64,
            "backend answered"
        );

        if let Err(e) = self.cache.set(&key, &text).await {
            warn!(%invocation_id, key = %key, error = %e, "cache write failed, result not cached");
        }
        Ok(text)
    }

    async fn call_backend(
        &self,
        adapter: &dyn BackendAdapter,
        prompt: &Prompt<'_>,
        attempt: u32,
    ) -> Result<String> {
        debug!(
            backend_id = adapter.backend_id(),
            model_id = adapter.model_id(),
            attempt,
            "calling backend"
        );
        match tokio::time::timeout(self.backend_timeout, adapter.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(Error::backend(
                FailureClass::Transient,
                adapter.backend_id(),
                prompt.model_or(adapter.model_id()),
                format!(
                    "no response within {}ms",
                    self.backend_timeout.as_millis()
                ),
                None,
            )),
        }
    }

    /// Cached keys matching a glob `pattern`, sorted.
    pub async fn list_cache_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.cache.find_by_pattern(pattern).await
    }

    /// Removes cached keys matching `pattern`; returns how many were removed.
    pub async fn invalidate_cache(&self, pattern: &str) -> Result<u64> {
        let deleted = self.cache.delete_matching(pattern).await?;
        info!(pattern, deleted, "cache invalidated");
        Ok(deleted)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn selector(&self) -> &ProviderSelector {
        &self.selector
    }

    pub fn resolve(&self, backend_id: &str) -> Result<Arc<dyn BackendAdapter>> {
        self.selector.resolve(backend_id)
    }
}
