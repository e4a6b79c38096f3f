//! Redis-backed cache store.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::backend::CacheStore;
use super::glob::GlobPattern;
use crate::{Error, ErrorContext, Result};

const STORE: &str = "redis";
const SCAN_COUNT: usize = 500;
const DELETE_CHUNK: usize = 500;

/// Connection parameters for [`RedisStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisSettings {
    /// `redis://[:password@]host:port/db`, with the password percent-encoded.
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db))
            .map_err(|e| {
                Error::configuration_with_context(
                    "invalid redis address",
                    ErrorContext::new()
                        .with_field_path("cache.redis_host")
                        .with_details(e.to_string()),
                )
            })?;
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password)).map_err(|_| {
                Error::configuration_with_context(
                    "redis password cannot be set on this address",
                    ErrorContext::new().with_field_path("cache.redis_password"),
                )
            })?;
        }
        Ok(url)
    }
}

/// Store over a single multiplexed Redis connection.
///
/// The connection is opened lazily and dropped after any command error, so a
/// Redis restart is picked up by the next call.
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .finish()
    }
}

fn unavailable(op: &str, e: redis::RedisError) -> Error {
    Error::cache_unavailable(STORE, format!("{} failed: {}", op, e))
}

impl RedisStore {
    pub fn open(settings: &RedisSettings) -> Result<Self> {
        let url = settings.url()?;
        let client = redis::Client::open(url.as_str()).map_err(|e| {
            Error::configuration_with_context(
                "invalid redis connection parameters",
                ErrorContext::new()
                    .with_field_path("cache")
                    .with_details(e.to_string()),
            )
        })?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| unavailable("connect", e))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        *self.conn.lock().await = None;
    }

    async fn query<T: redis::FromRedisValue>(&self, op: &str, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.connection().await?;
        match cmd.query_async::<_, T>(&mut conn).await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.reset().await;
                Err(unavailable(op, e))
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // EX takes whole seconds; zero would be rejected by the server.
        let secs = ttl.as_secs().max(1);
        self.query::<()>(
            "SET",
            redis::cmd("SET").arg(key).arg(value).arg("EX").arg(secs),
        )
        .await
    }

    async fn scan(&self, pattern: &GlobPattern) -> Result<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .query(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern.as_str())
                        .arg("COUNT")
                        .arg(SCAN_COUNT),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        debug!(pattern = pattern.as_str(), count = keys.len(), "redis scan");
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0u64;
        for chunk in keys.chunks(DELETE_CHUNK) {
            let n: u64 = self.query("DEL", redis::cmd("DEL").arg(chunk)).await?;
            removed += n;
        }
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        STORE
    }
}
