use thiserror::Error;

/// Structured error context for configuration and input failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "cache.ttl_secs", "csv.header_subject")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "csv_reader")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// How a backend failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Quota or rate exhaustion; retry after backing off.
    RateLimited,
    /// Network, timeout or provider-side failure; retry.
    Transient,
    /// Malformed request, bad credentials, unusable response; never retried.
    Fatal,
}

impl FailureClass {
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unified error type for bug-oracle.
///
/// Backend variants always name the backend and model involved so an operator
/// can tell a degraded cache from an exhausted quota from a bad configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Cache unavailable ({store}): {message}")]
    CacheUnavailable {
        store: &'static str,
        message: String,
    },

    #[error("Rate limited by {backend_id}/{model_id}: {message}")]
    RateLimited {
        backend_id: String,
        model_id: String,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Transient failure from {backend_id}/{model_id}: {message}")]
    Transient {
        backend_id: String,
        model_id: String,
        message: String,
    },

    #[error("Fatal failure from {backend_id}/{model_id}: {message}")]
    Fatal {
        backend_id: String,
        model_id: String,
        message: String,
    },

    #[error("Retries exhausted after {attempts} attempt(s): {last}")]
    RetryExhausted { attempts: u32, last: Box<Error> },

    #[error("Invalid input: {message}{}", format_context(.context))]
    Input {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new input error with structured context
    pub fn input_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Input {
            message: msg.into(),
            context,
        }
    }

    pub fn cache_unavailable(store: &'static str, msg: impl Into<String>) -> Self {
        Error::CacheUnavailable {
            store,
            message: msg.into(),
        }
    }

    /// Build the backend failure variant matching `class`.
    pub fn backend(
        class: FailureClass,
        backend_id: impl Into<String>,
        model_id: impl Into<String>,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let backend_id = backend_id.into();
        let model_id = model_id.into();
        let message = message.into();
        match class {
            FailureClass::RateLimited => Error::RateLimited {
                backend_id,
                model_id,
                message,
                retry_after_ms,
            },
            FailureClass::Transient => Error::Transient {
                backend_id,
                model_id,
                message,
            },
            FailureClass::Fatal => Error::Fatal {
                backend_id,
                model_id,
                message,
            },
        }
    }

    /// Retry classification of a backend failure; `None` for everything else.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Error::RateLimited { .. } => Some(FailureClass::RateLimited),
            Error::Transient { .. } => Some(FailureClass::Transient),
            Error::Fatal { .. } => Some(FailureClass::Fatal),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_class()
            .map(FailureClass::is_retryable)
            .unwrap_or(false)
    }

    /// Provider-supplied wait hint carried by a rate-limit failure.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Error::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Backend and model identifiers involved in a backend failure.
    pub fn backend_ids(&self) -> Option<(&str, &str)> {
        match self {
            Error::RateLimited {
                backend_id,
                model_id,
                ..
            }
            | Error::Transient {
                backend_id,
                model_id,
                ..
            }
            | Error::Fatal {
                backend_id,
                model_id,
                ..
            } => Some((backend_id, model_id)),
            Error::RetryExhausted { last, .. } => last.backend_ids(),
            _ => None,
        }
    }

    /// Short, stable name of the failure kind for logs and exit messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "configuration",
            Error::CacheUnavailable { .. } => "cache_unavailable",
            Error::RateLimited { .. } => "rate_limited",
            Error::Transient { .. } => "transient",
            Error::Fatal { .. } => "fatal",
            Error::RetryExhausted { .. } => "retry_exhausted",
            Error::Input { .. } => "input",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Csv(_) => "csv",
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Input { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_constructor_picks_variant() {
        let err = Error::backend(FailureClass::RateLimited, "openai", "gpt-4o", "slow down", Some(1500));
        assert_eq!(err.failure_class(), Some(FailureClass::RateLimited));
        assert_eq!(err.retry_after_ms(), Some(1500));
        assert!(err.is_retryable());

        let err = Error::backend(FailureClass::Fatal, "openai", "gpt-4o", "bad key", Some(10));
        assert_eq!(err.failure_class(), Some(FailureClass::Fatal));
        assert_eq!(err.retry_after_ms(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_exhausted_reports_backend() {
        let last = Error::backend(FailureClass::Transient, "ollama", "llama3", "connection refused", None);
        let err = Error::RetryExhausted {
            attempts: 3,
            last: Box::new(last),
        };
        assert_eq!(err.backend_ids(), Some(("ollama", "llama3")));
        assert_eq!(err.kind(), "retry_exhausted");
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains("ollama/llama3"));
    }

    #[test]
    fn test_context_formatting() {
        let err = Error::configuration_with_context(
            "missing API key",
            ErrorContext::new()
                .with_field_path("backends.openai.api_key")
                .with_source("provider_selector"),
        );
        assert_eq!(
            err.to_string(),
            "Configuration error: missing API key (field: backends.openai.api_key, source: provider_selector)"
        );
        assert!(err.context().is_some());
    }
}
