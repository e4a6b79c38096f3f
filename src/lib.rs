//! # bug-oracle
//!
//! 基于大语言模型的缺陷报告分类器：带指纹缓存、多后端适配与统一重试策略。
//!
//! LLM-backed classifier for e-commerce bug reports. Incidents read from a
//! CSV export are labelled along three taxonomy dimensions (technological
//! component, functional area, problem type), aggregated per month and
//! exported together with an LLM-written insights report.
//!
//! ## Core Philosophy
//!
//! - **Pay once per question**: every request is fingerprinted and its answer
//!   cached, so re-running a dataset costs nothing for incidents already seen
//! - **Backend-agnostic**: OpenAI, xAI Grok, Anthropic, Gemini and Ollama sit
//!   behind one [`drivers::BackendAdapter`] trait
//! - **Failure-aware**: rate limits and transient failures are retried with
//!   capped exponential backoff; fatal failures surface at once
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bug_oracle::{Config, Mediator, Request};
//!
//! #[tokio::main]
//! async fn main() -> bug_oracle::Result<()> {
//!     let config = Config::load(None)?;
//!     let mediator = Mediator::from_config(&config)?;
//!
//!     let backend_id = config.backend_id()?;
//!     let request = Request::new(backend_id, config.model_for(backend_id))
//!         .with_role("You classify e-commerce incidents.")
//!         .with_payload("Checkout button unresponsive on mobile");
//!
//!     let text = mediator.invoke(&request).await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`mediator`] | `invoke`, cache inspection and invalidation |
//! | [`cache`] | Fingerprints, response cache and its stores |
//! | [`drivers`] | Backend adapters, one driver per provider family |
//! | [`resilience`] | Shared retry and backoff policy |
//! | [`selector`] | Backend id to adapter resolution |
//! | [`prompt`] | Processing and insights prompt builders |
//! | [`ingest`] | CSV ingestion |
//! | [`classify`] | Per-incident classification pipeline |
//! | [`summary`] | Totals per dimension and month |
//! | [`export`] | CSV and JSON output |
//! | [`config`] | YAML and environment configuration |

pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod drivers;
pub mod error_code;
pub mod export;
pub mod ingest;
pub mod mediator;
pub mod prompt;
pub mod resilience;
pub mod selector;
pub mod summary;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use cache::{fingerprint, Fingerprint, ResponseCache};
pub use classify::{Classification, ClassifiedIncident, Classifier};
pub use config::Config;
pub use drivers::{BackendAdapter, BackendKind};
pub use error::FailureClass;
pub use mediator::{Mediator, MediatorBuilder};
pub use selector::ProviderSelector;
pub use types::{Message, MessageRole, Prompt, Request};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
