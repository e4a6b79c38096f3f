//! 后端适配层：通过 trait 统一多家模型服务的调用方式
//!
//! Backend adapter layer. Every model service is reached through the same
//! [`BackendAdapter`] trait; the differences between wire formats live in small
//! [`ProviderDriver`] implementations, and [`HttpAdapter`] pairs a driver with
//! an HTTP transport and turns failures into retry classes.

pub mod adapter;
pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::types::Prompt;
use crate::{Error, ErrorContext, Result};

pub use adapter::HttpAdapter;
pub use anthropic::AnthropicDriver;
pub use gemini::GeminiDriver;
pub use ollama::OllamaDriver;
pub use openai::OpenAiDriver;

/// Uniform entry point to one model backend.
///
/// Implementations classify every failure as rate-limited, transient or fatal
/// (see [`crate::FailureClass`]) and never cache or retry themselves.
#[async_trait]
pub trait BackendAdapter: Send + Sync + fmt::Debug {
    fn backend_id(&self) -> &str;

    /// Model used when the prompt does not name one.
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &Prompt<'_>) -> Result<String>;
}

/// Supported backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenAi,
    Grok,
    Anthropic,
    Gemini,
    Ollama,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::OpenAi,
        BackendKind::Grok,
        BackendKind::Anthropic,
        BackendKind::Gemini,
        BackendKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Grok => "grok",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Grok => "https://api.x.ai/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Grok => "grok-2-latest",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Gemini => "gemini-1.5-flash",
            Self::Ollama => "llama3.1",
        }
    }

    /// Locally hosted servers run without credentials.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Prefix of the `<PREFIX>_API_KEY` / `_MODEL` / `_BASE_URL` variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Grok => "GROK",
            Self::Anthropic => "ANTHROPIC",
            Self::Gemini => "GEMINI",
            Self::Ollama => "OLLAMA",
        }
    }

    pub(crate) fn driver(&self) -> Box<dyn ProviderDriver> {
        match self {
            Self::OpenAi | Self::Grok => Box::new(OpenAiDriver),
            Self::Anthropic => Box::new(AnthropicDriver),
            Self::Gemini => Box::new(GeminiDriver),
            Self::Ollama => Box::new(OllamaDriver),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        BackendKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    format!("unsupported backend '{}'", s),
                    ErrorContext::new()
                        .with_field_path("backend")
                        .with_details(format!(
                            "expected one of: {}",
                            BackendKind::ALL
                                .iter()
                                .map(|k| k.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        )),
                )
            })
    }
}

/// Static configuration of one adapter instance.
#[derive(Clone, PartialEq)]
pub struct AdapterSettings {
    pub backend_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl AdapterSettings {
    pub fn for_kind(kind: BackendKind) -> Self {
        Self {
            backend_id: kind.as_str().to_string(),
            api_key: None,
            base_url: kind.default_base_url().to_string(),
            model: kind.default_model().to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, t: f64) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// Credentials stay out of logs.
impl fmt::Debug for AdapterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterSettings")
            .field("backend_id", &self.backend_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Provider-specific HTTP call derived from a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverRequest {
    /// Path appended to the base URL.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Wire-format translation for one API style.
pub trait ProviderDriver: Send + Sync + fmt::Debug {
    fn build_request(&self, prompt: &Prompt<'_>, settings: &AdapterSettings) -> DriverRequest;

    /// Generated text, or a description of why the body holds none.
    fn parse_response(&self, body: &Value) -> std::result::Result<String, String>;

    /// Provider error code from an error body, e.g. `insufficient_quota`.
    fn error_code(&self, body: &Value) -> Option<String>;

    /// Human-readable message from an error body.
    fn error_message(&self, body: &Value) -> Option<String> {
        body.pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

/// Adds `temperature`/`max_tokens` style keys only when configured.
pub(crate) fn insert_opt<T: serde::Serialize>(body: &mut Value, key: &str, value: Option<T>) {
    if let (Some(v), Value::Object(map)) = (value, body) {
        if let Ok(v) = serde_json::to_value(v) {
            map.insert(key.to_string(), v);
        }
    }
}
