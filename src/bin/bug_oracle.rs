//! bug-oracle：读取缺陷 CSV，逐条分类，统计并导出结果。
//!
//! Usage:
//!   bug-oracle [--config <file>] [--csv <file>] [--backend <id>] [--format csv|json]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bug_oracle::config::{CacheStoreKind, Config};
use bug_oracle::export::{ExportFormat, Exporter};
use bug_oracle::ingest::load_incidents;
use bug_oracle::prompt::{preprocess_summary, InsightsPromptBuilder, ProcessingPromptBuilder};
use bug_oracle::summary::Summarizer;
use bug_oracle::{Classifier, Mediator};

#[derive(Parser, Debug)]
#[command(
    name = "bug-oracle",
    version,
    about = "Classify bug reports with an LLM and export totals and insights"
)]
struct Args {
    /// YAML configuration file; environment variables override it
    #[arg(long, env = "BUG_ORACLE_CONFIG")]
    config: Option<PathBuf>,

    /// Input CSV export
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Backend id (openai, grok, anthropic, gemini, ollama)
    #[arg(long)]
    backend: Option<String>,

    /// Output format
    #[arg(long)]
    format: Option<ExportFormat>,

    /// Root directory for exported files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Incidents classified in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Skip the response cache for this run
    #[arg(long)]
    no_cache: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(csv) = &self.csv {
            config.csv.path = Some(csv.clone());
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if let Some(format) = self.format {
            config.export.format = format;
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if self.no_cache {
            config.cache.store = CacheStoreKind::None;
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let csv_path = config.csv_path()?.to_path_buf();
    let incidents = load_incidents(&csv_path, &config.csv)
        .with_context(|| format!("reading {}", csv_path.display()))?;
    info!(path = %csv_path.display(), incidents = incidents.len(), "input loaded");

    let mediator = Arc::new(Mediator::from_config(&config).context("building mediator")?);

    let classifier = Classifier::new(mediator.clone(), ProcessingPromptBuilder::from_config(&config)?)
        .with_concurrency(config.concurrency);
    let classified = classifier.classify(incidents).await?;

    let summary = Summarizer::new(config.export.dimensions).summarize(&classified)?;

    let digest = preprocess_summary(&summary);
    let insights_request =
        InsightsPromptBuilder::from_config(&config)?.build(&digest, &config.export.language)?;
    let insights = mediator
        .invoke(&insights_request)
        .await
        .context("generating insights")?;

    let exporter = Exporter::from_settings(&config.export, &config.csv)?;
    let paths = exporter.export(&classified, &summary, &insights)?;
    for path in &paths {
        info!(path = %path.display(), "written");
    }
    info!("Data successfully generated at {}", exporter.dir().display());

    let stats = mediator.cache_stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        errors = stats.errors,
        "cache usage"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();

    let args = Args::parse();
    let started = Instant::now();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);
    config.normalize()?;
    config.validate()?;

    let result = run(config).await;
    info!(
        "Total execution time: {:.2} seconds.",
        started.elapsed().as_secs_f64()
    );
    result
}
