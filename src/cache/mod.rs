//! 响应缓存模块：以请求指纹为键，避免对同一请求重复调用模型。
//!
//! # Response Cache
//!
//! Every LLM request is reduced to a [`Fingerprint`] and its answer is kept in
//! a [`CacheStore`] under `"<prefix>:<fingerprint>"` for a configured TTL.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Prefixing, TTL, per-call timeouts and statistics |
//! | [`CacheStore`] | Trait for pluggable stores |
//! | [`RedisStore`] | Durable store shared across runs |
//! | [`MemoryStore`] | In-process store with clock-driven expiry |
//! | [`NullStore`] | Caching disabled |
//! | [`GlobPattern`] | Redis-style key patterns for inspection and invalidation |
//!
//! ## Example
//!
//! ```rust
//! use bug_oracle::cache::{fingerprint, CacheConfig, MemoryStore, ResponseCache};
//! use bug_oracle::types::Request;
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let cache = ResponseCache::new(CacheConfig::default(), Arc::new(MemoryStore::new(1000)));
//! let key = fingerprint(&Request::new("openai", "gpt-4o").with_payload("Cart total wrong"));
//! cache.set(&key, "Functional Error").await.unwrap();
//! assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("Functional Error"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

mod backend;
mod glob;
mod key;
mod manager;
mod redis;

pub use backend::{CacheStore, MemoryStore, NullStore};
pub use glob::GlobPattern;
pub use key::{fingerprint, Fingerprint};
pub use manager::{CacheConfig, CacheStats, ResponseCache, DEFAULT_KEY_PREFIX};
pub use self::redis::{RedisSettings, RedisStore};
