//! 配置：YAML 文件 + 环境变量覆盖。
//!
//! Runtime configuration.
//!
//! A [`Config`] is built once at process entry and passed down by reference.
//! Values come from, in increasing precedence: built-in defaults, an optional
//! YAML file, and environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `LLM_PROVIDER` | `backend` |
//! | `<BACKEND>_API_KEY`, `<BACKEND>_MODEL`, `<BACKEND>_BASE_URL` | `backends.<id>` |
//! | `CACHE_STORE`, `CACHE_TTL_SECONDS`, `CACHE_KEY_PREFIX` | `cache` |
//! | `REDIS_HOST`, `REDIS_PORT`, `REDIS_DB`, `REDIS_PASSWORD` | `cache` |
//! | `RETRY_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS` | `retry` |
//! | `CSV_DATA_PATH`, `CSV_DELIMITER`, `CSV_QUOTECHAR`, `CSV_HEADER_*` | `csv` |
//! | `EXPORT_FORMAT`, `EXPORT_LANGUAGE`, `EXPORT_SUBDIRECTORY`, `EXPORT_OUTPUT_DIR` | `export` |
//! | `EXPORT_<DIMENSION>[_SUBCATEGORY]` (0/1) | `export.dimensions` |
//! | `ASSISTANT_*_PROCESSING`, `ASSISTANT_*_INSIGHTS` | `assistant` |
//! | `DIMENSION_TECHNOLOGICAL_COMPONENT`, `DIMENSION_FUNCTIONAL_AREA`, `DIMENSION_PROBLEM_TYPE` | `taxonomy` |
//! | `LLM_CONCURRENCY` | `concurrency` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, RedisSettings, DEFAULT_KEY_PREFIX};
use crate::drivers::{AdapterSettings, BackendKind};
use crate::export::ExportFormat;
use crate::resilience::RetryConfig;
use crate::summary::DimensionToggles;
use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend used for every request, e.g. `openai`.
    pub backend: String,
    pub backends: BTreeMap<String, BackendSettings>,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub csv: CsvSettings,
    pub export: ExportSettings,
    pub assistant: AssistantSettings,
    pub taxonomy: TaxonomySettings,
    /// Incidents classified in parallel.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::OpenAi.as_str().to_string(),
            backends: BTreeMap::new(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            csv: CsvSettings::default(),
            export: ExportSettings::default(),
            assistant: AssistantSettings::default(),
            taxonomy: TaxonomySettings::default(),
            concurrency: 4,
        }
    }
}

/// Per-backend overrides; anything unset falls back to the family default.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreKind {
    Redis,
    Memory,
    None,
}

impl FromStr for CacheStoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "none" | "off" | "disabled" => Ok(Self::None),
            other => Err(Error::configuration_with_context(
                format!("unknown cache store '{}'", other),
                ErrorContext::new()
                    .with_field_path("cache.store")
                    .with_details("expected redis, memory or none"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub store: CacheStoreKind,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub redis_password: Option<String>,
    pub ttl_secs: u64,
    pub key_prefix: String,
    pub operation_timeout_ms: u64,
    /// Entry limit for the in-process store.
    pub memory_max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            store: CacheStoreKind::Redis,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: None,
            ttl_secs: 7 * 24 * 3600,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            operation_timeout_ms: 2000,
            memory_max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// Bound on a single backend call, per attempt.
    pub backend_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter: true,
            backend_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSettings {
    pub path: Option<PathBuf>,
    pub delimiter: String,
    pub quote: String,
    pub header_subject: String,
    pub header_changed: String,
    pub header_description: String,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            path: None,
            delimiter: ",".to_string(),
            quote: "\"".to_string(),
            header_subject: "Summary".to_string(),
            header_changed: "Updated".to_string(),
            header_description: "Description".to_string(),
        }
    }
}

impl CsvSettings {
    pub fn delimiter_byte(&self) -> Result<u8> {
        single_byte(&self.delimiter, "csv.delimiter")
    }

    pub fn quote_byte(&self) -> Result<u8> {
        single_byte(&self.quote, "csv.quote")
    }
}

fn single_byte(value: &str, field: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(Error::configuration_with_context(
            format!("'{}' must be a single ASCII character", value),
            ErrorContext::new().with_field_path(field),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub format: ExportFormat,
    /// Language the insights report is written in.
    pub language: String,
    pub output_dir: PathBuf,
    pub subdirectory: String,
    pub dimensions: DimensionToggles,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            language: "English".to_string(),
            output_dir: PathBuf::from("output"),
            subdirectory: String::new(),
            dimensions: DimensionToggles::default(),
        }
    }
}

impl ExportSettings {
    pub fn target_dir(&self) -> PathBuf {
        let sub = self.subdirectory.trim().trim_matches('/');
        if sub.is_empty() {
            self.output_dir.clone()
        } else {
            self.output_dir.join(sub)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    pub processing_role: String,
    pub processing_context: String,
    pub processing_additional_instructions: String,
    pub insights_role: String,
    pub insights_context: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            processing_role: "You are a senior software engineer who triages incident reports \
                for an e-commerce platform. Classify each incident precisely and consistently."
                .to_string(),
            processing_context: "An e-commerce platform with a web storefront, a mobile app, \
                back-office services and third-party integrations for search, payments, \
                marketing and logistics."
                .to_string(),
            processing_additional_instructions: String::new(),
            insights_role: "You are a software architect reviewing incident statistics for an \
                e-commerce platform. Produce a global overview of trends, recurring problems \
                and improvement priorities."
                .to_string(),
            insights_context: "The statistics were produced by classifying every reported \
                incident by technological component, functional area and problem type."
                .to_string(),
        }
    }
}

/// Operator-supplied label sets for the three classification dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomySettings {
    pub technological_component: String,
    pub functional_area: String,
    pub problem_type: String,
}

impl Default for TaxonomySettings {
    fn default() -> Self {
        Self {
            technological_component: "Backend, Frontend, Mobile App, Search Service, \
                Email Marketing, Logistics API, Infrastructure, Other"
                .to_string(),
            functional_area: "Search, Product Catalog, Shopping Cart, Checkout, \
                Order Management, Logistics, Email Marketing, Mobile Experience, Pricing, \
                Translations, Other"
                .to_string(),
            problem_type: "Functional Error, Performance Issue, Integration Failure, UX Issue, \
                Security Issue, Configuration Error, Infrastructure Failure, \
                Data Synchronization Issue"
                .to_string(),
        }
    }
}

impl Config {
    /// Defaults, then `path` (YAML) if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.normalize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file {}", path.display()),
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                "invalid config file",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })
    }

    /// Overlays variables returned by `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LLM_PROVIDER") {
            self.backend = v.trim().to_ascii_lowercase();
        }
        for kind in BackendKind::ALL {
            let prefix = kind.env_prefix();
            let key = get(&format!("{}_API_KEY", prefix));
            let model = get(&format!("{}_MODEL", prefix));
            let base_url = get(&format!("{}_BASE_URL", prefix));
            if key.is_none() && model.is_none() && base_url.is_none() {
                continue;
            }
            let entry = self.backends.entry(kind.as_str().to_string()).or_default();
            if key.is_some() {
                entry.api_key = key;
            }
            if model.is_some() {
                entry.model = model;
            }
            if base_url.is_some() {
                entry.base_url = base_url;
            }
        }

        if let Some(v) = get("CACHE_STORE") {
            self.cache.store = v.parse()?;
        }
        if let Some(v) = get("CACHE_TTL_SECONDS") {
            self.cache.ttl_secs = parse_num(&v, "CACHE_TTL_SECONDS")?;
        }
        if let Some(v) = get("CACHE_KEY_PREFIX") {
            self.cache.key_prefix = v;
        }
        if let Some(v) = get("REDIS_HOST") {
            self.cache.redis_host = v;
        }
        if let Some(v) = get("REDIS_PORT") {
            self.cache.redis_port = parse_num(&v, "REDIS_PORT")?;
        }
        if let Some(v) = get("REDIS_DB") {
            self.cache.redis_db = parse_num(&v, "REDIS_DB")?;
        }
        if let Some(v) = get("REDIS_PASSWORD") {
            self.cache.redis_password = Some(v);
        }

        if let Some(v) = get("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_num(&v, "RETRY_MAX_ATTEMPTS")?;
        }
        if let Some(v) = get("RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_num(&v, "RETRY_BASE_DELAY_MS")?;
        }
        if let Some(v) = get("RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_num(&v, "RETRY_MAX_DELAY_MS")?;
        }
        if let Some(v) = get("LLM_TIMEOUT_SECONDS") {
            self.retry.backend_timeout_secs = parse_num(&v, "LLM_TIMEOUT_SECONDS")?;
        }
        if let Some(v) = get("LLM_CONCURRENCY") {
            self.concurrency = parse_num(&v, "LLM_CONCURRENCY")?;
        }

        if let Some(v) = get("CSV_DATA_PATH") {
            self.csv.path = Some(PathBuf::from(v));
        }
        // Delimiter and quote may legitimately be whitespace, e.g. a tab.
        if let Some(v) = lookup("CSV_DELIMITER").filter(|v| !v.is_empty()) {
            self.csv.delimiter = v;
        }
        if let Some(v) = lookup("CSV_QUOTECHAR").filter(|v| !v.is_empty()) {
            self.csv.quote = v;
        }
        if let Some(v) = get("CSV_HEADER_SUBJECT") {
            self.csv.header_subject = v;
        }
        if let Some(v) = get("CSV_HEADER_CHANGED") {
            self.csv.header_changed = v;
        }
        if let Some(v) = get("CSV_HEADER_DESCRIPTION") {
            self.csv.header_description = v;
        }

        if let Some(v) = get("EXPORT_FORMAT") {
            self.export.format = v.parse()?;
        }
        if let Some(v) = get("EXPORT_LANGUAGE") {
            self.export.language = v;
        }
        if let Some(v) = get("EXPORT_SUBDIRECTORY") {
            self.export.subdirectory = v;
        }
        if let Some(v) = get("EXPORT_OUTPUT_DIR") {
            self.export.output_dir = PathBuf::from(v);
        }
        let dims = &mut self.export.dimensions;
        let toggles: [(&str, &mut bool); 6] = [
            ("EXPORT_TECHNOLOGICAL_COMPONENT", &mut dims.technological_component),
            (
                "EXPORT_TECHNOLOGICAL_COMPONENT_SUBCATEGORY",
                &mut dims.technological_component_subcategory,
            ),
            ("EXPORT_FUNCTIONAL_AREA", &mut dims.functional_area),
            (
                "EXPORT_FUNCTIONAL_AREA_SUBCATEGORY",
                &mut dims.functional_area_subcategory,
            ),
            ("EXPORT_PROBLEM_TYPE", &mut dims.problem_type),
            (
                "EXPORT_PROBLEM_TYPE_SUBCATEGORY",
                &mut dims.problem_type_subcategory,
            ),
        ];
        for (name, slot) in toggles {
            if let Some(v) = get(name) {
                *slot = parse_flag(&v, name)?;
            }
        }

        let texts: [(&str, &mut String); 8] = [
            ("ASSISTANT_ROLE_PROCESSING", &mut self.assistant.processing_role),
            (
                "ASSISTANT_CONTEXT_PROCESSING",
                &mut self.assistant.processing_context,
            ),
            (
                "ASSISTANT_ADDITIONAL_INSTRUCTIONS_PROCESSING",
                &mut self.assistant.processing_additional_instructions,
            ),
            ("ASSISTANT_ROLE_INSIGHTS", &mut self.assistant.insights_role),
            ("ASSISTANT_CONTEXT_INSIGHTS", &mut self.assistant.insights_context),
            (
                "DIMENSION_TECHNOLOGICAL_COMPONENT",
                &mut self.taxonomy.technological_component,
            ),
            ("DIMENSION_FUNCTIONAL_AREA", &mut self.taxonomy.functional_area),
            ("DIMENSION_PROBLEM_TYPE", &mut self.taxonomy.problem_type),
        ];
        for (name, slot) in texts {
            if let Some(v) = get(name) {
                *slot = v;
            }
        }

        Ok(())
    }

    /// Rewrites `backend` and the `backends` keys to canonical ids, so
    /// `OpenAI` and `openai` name the same adapter, settings and cache keys.
    /// Call again after changing `backend` by hand.
    pub fn normalize(&mut self) -> Result<()> {
        self.backend = self.backend_kind()?.as_str().to_string();

        let mut canonical = BTreeMap::new();
        for (id, settings) in std::mem::take(&mut self.backends) {
            let kind = BackendKind::from_str(&id).map_err(|_| unknown_backend_settings(&id))?;
            if canonical.insert(kind.as_str().to_string(), settings).is_some() {
                return Err(Error::configuration_with_context(
                    format!("backend '{}' is configured more than once", kind),
                    ErrorContext::new()
                        .with_field_path(format!("backends.{}", id))
                        .with_details("backend ids are case-insensitive")
                        .with_source("config_validation"),
                ));
            }
        }
        self.backends = canonical;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        BackendKind::from_str(&self.backend)?;

        for (id, settings) in &self.backends {
            BackendKind::from_str(id).map_err(|_| unknown_backend_settings(id))?;
            if let Some(base) = &settings.base_url {
                url::Url::parse(base).map_err(|e| {
                    Error::configuration_with_context(
                        format!("invalid base URL '{}'", base),
                        ErrorContext::new()
                            .with_field_path(format!("backends.{}.base_url", id))
                            .with_details(e.to_string()),
                    )
                })?;
            }
        }

        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", "must be greater than zero"));
        }
        if self.cache.operation_timeout_ms == 0 {
            return Err(invalid("cache.operation_timeout_ms", "must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.retry.backend_timeout_secs == 0 {
            return Err(invalid("retry.backend_timeout_secs", "must be greater than zero"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        self.csv.delimiter_byte()?;
        self.csv.quote_byte()?;
        Ok(())
    }

    pub fn backend_kind(&self) -> Result<BackendKind> {
        self.backend.parse()
    }

    /// Canonical id of the selected backend, as adapters register it.
    pub fn backend_id(&self) -> Result<&'static str> {
        Ok(self.backend_kind()?.as_str())
    }

    // Keys are matched by kind so settings apply before `normalize` runs too.
    fn backend_settings(&self, kind: BackendKind) -> Option<&BackendSettings> {
        self.backends.get(kind.as_str()).or_else(|| {
            self.backends
                .iter()
                .find(|(id, _)| BackendKind::from_str(id).ok() == Some(kind))
                .map(|(_, settings)| settings)
        })
    }

    /// Model the given backend will be asked for.
    pub fn model_for(&self, backend_id: &str) -> String {
        let Ok(kind) = BackendKind::from_str(backend_id) else {
            return String::new();
        };
        self.backend_settings(kind)
            .and_then(|s| s.model.clone())
            .unwrap_or_else(|| kind.default_model().to_string())
    }

    pub fn adapter_settings(&self, kind: BackendKind) -> AdapterSettings {
        let mut settings = AdapterSettings::for_kind(kind)
            .with_timeout(Duration::from_secs(self.retry.backend_timeout_secs));
        if let Some(over) = self.backend_settings(kind) {
            settings.api_key = over.api_key.clone();
            if let Some(url) = &over.base_url {
                settings.base_url = url.clone();
            }
            if let Some(model) = &over.model {
                settings.model = model.clone();
            }
            settings.temperature = over.temperature;
            settings.max_tokens = over.max_tokens;
            if let Some(t) = over.timeout_secs {
                settings.timeout = Duration::from_secs(t);
            }
        }
        settings
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_enabled(self.cache.store != CacheStoreKind::None)
            .with_ttl(Duration::from_secs(self.cache.ttl_secs))
            .with_key_prefix(self.cache.key_prefix.clone())
            .with_op_timeout(Duration::from_millis(self.cache.operation_timeout_ms))
    }

    pub fn redis_settings(&self) -> RedisSettings {
        RedisSettings {
            host: self.cache.redis_host.clone(),
            port: self.cache.redis_port,
            db: self.cache.redis_db,
            password: self.cache.redis_password.clone(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.retry.max_attempts)
            .with_base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_jitter(self.retry.jitter)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.retry.backend_timeout_secs)
    }

    pub fn csv_path(&self) -> Result<&Path> {
        self.csv.path.as_deref().ok_or_else(|| {
            Error::configuration_with_context(
                "no input CSV configured",
                ErrorContext::new()
                    .with_field_path("csv.path")
                    .with_details("set CSV_DATA_PATH or pass --csv"),
            )
        })
    }
}

fn unknown_backend_settings(id: &str) -> Error {
    Error::configuration_with_context(
        format!("settings given for unknown backend '{}'", id),
        ErrorContext::new().with_field_path(format!("backends.{}", id)),
    )
}

fn invalid(field: &str, details: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {}", field),
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config_validation"),
    )
}

fn parse_num<T: FromStr>(value: &str, name: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::configuration_with_context(
            format!("{} must be a number, got '{}'", name, value),
            ErrorContext::new().with_field_path(name),
        )
    })
}

/// `0` disables, any other integer enables.
fn parse_flag(value: &str, name: &str) -> Result<bool> {
    value
        .trim()
        .parse::<i64>()
        .map(|n| n != 0)
        .map_err(|_| {
            Error::configuration_with_context(
                format!("invalid boolean value for {}: '{}'", name, value),
                ErrorContext::new()
                    .with_field_path(name)
                    .with_details("expected 0 or 1"),
            )
        })
}
