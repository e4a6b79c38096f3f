//! bug-oracle-cache 缓存维护工具：按模式列出或删除缓存键。
//!
//! Usage:
//!   bug-oracle-cache list <pattern>
//!   bug-oracle-cache invalidate <pattern>

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use bug_oracle::cache::{CacheStore, MemoryStore, NullStore, RedisStore, ResponseCache};
use bug_oracle::config::{CacheStoreKind, Config};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "bug-oracle-cache",
    version,
    about = "Inspect and invalidate cached LLM responses"
)]
struct Args {
    /// YAML configuration file; environment variables override it
    #[arg(long, env = "BUG_ORACLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every cached key matching the glob pattern
    List { pattern: String },
    /// Delete every cached key matching the glob pattern
    Invalidate { pattern: String },
}

// Only the cache store is needed here, so no backend credentials are required.
fn open_cache(config: &Config) -> anyhow::Result<ResponseCache> {
    let store: Arc<dyn CacheStore> = match config.cache.store {
        CacheStoreKind::Redis => Arc::new(
            RedisStore::open(&config.redis_settings()).context("opening redis store")?,
        ),
        CacheStoreKind::Memory => Arc::new(MemoryStore::new(config.cache.memory_max_entries)),
        CacheStoreKind::None => Arc::new(NullStore::new()),
    };
    Ok(ResponseCache::new(config.cache_config(), store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .try_init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    let cache = open_cache(&config)?;

    match args.command {
        Command::List { pattern } => {
            for key in cache.find_by_pattern(&pattern).await? {
                println!("{}", key);
            }
        }
        Command::Invalidate { pattern } => {
            let deleted = cache.delete_matching(&pattern).await?;
            if deleted > 0 {
                println!("{} keys matching '{}' were deleted.", deleted, pattern);
            } else {
                println!("No keys found with the given pattern.");
            }
        }
    }
    Ok(())
}
