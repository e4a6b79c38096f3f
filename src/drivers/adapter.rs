use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

use super::{AdapterSettings, BackendAdapter, BackendKind, ProviderDriver};
use crate::error::FailureClass;
use crate::error_code::StandardErrorCode;
use crate::transport::{HttpFailure, HttpTransport};
use crate::types::Prompt;
use crate::{Error, ErrorContext, Result};

/// Longest slice of a provider error body copied into an error message.
const MAX_ERROR_BODY: usize = 512;

/// [`BackendAdapter`] that reaches a backend over HTTP through a
/// [`ProviderDriver`].
#[derive(Debug)]
pub struct HttpAdapter {
    settings: AdapterSettings,
    driver: Box<dyn ProviderDriver>,
    transport: HttpTransport,
}

impl HttpAdapter {
    pub fn new(
        settings: AdapterSettings,
        driver: Box<dyn ProviderDriver>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(&settings.base_url, settings.timeout)?;
        Ok(Self {
            settings,
            driver,
            transport,
        })
    }

    /// Adapter for a built-in backend family. Fails when the family needs an
    /// API key and none is configured.
    pub fn for_kind(kind: BackendKind, settings: AdapterSettings) -> Result<Self> {
        let has_key = settings
            .api_key
            .as_deref()
            .map_or(false, |k| !k.trim().is_empty());
        if kind.requires_api_key() && !has_key {
            return Err(Error::configuration_with_context(
                format!("missing API key for backend '{}'", settings.backend_id),
                ErrorContext::new()
                    .with_field_path(format!("backends.{}.api_key", settings.backend_id))
                    .with_details(format!("set {}_API_KEY", kind.env_prefix()))
                    .with_source("provider_selector"),
            ));
        }
        Self::new(settings, kind.driver())
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn failure(&self, model: &str, failure: HttpFailure) -> Error {
        let backend_id = self.settings.backend_id.as_str();
        match failure {
            HttpFailure::Timeout => Error::backend(
                FailureClass::Transient,
                backend_id,
                model,
                format!("no response within {}s", self.settings.timeout.as_secs()),
                None,
            ),
            HttpFailure::Connect(msg) | HttpFailure::Network(msg) => {
                Error::backend(FailureClass::Transient, backend_id, model, msg, None)
            }
            HttpFailure::Decode(msg) => Error::backend(
                FailureClass::Fatal,
                backend_id,
                model,
                format!("malformed response: {}", msg),
                None,
            ),
            HttpFailure::Invalid(msg) => {
                Error::backend(FailureClass::Fatal, backend_id, model, msg, None)
            }
            HttpFailure::Status {
                status,
                body,
                retry_after_ms,
            } => {
                let parsed: Option<Value> = serde_json::from_str(&body).ok();
                let provider_code = parsed.as_ref().and_then(|b| self.driver.error_code(b));
                let code = StandardErrorCode::classify(status, provider_code.as_deref());
                let detail = parsed
                    .as_ref()
                    .and_then(|b| self.driver.error_message(b))
                    .unwrap_or_else(|| truncate(&body, MAX_ERROR_BODY));
                Error::backend(
                    code.failure_class(),
                    backend_id,
                    model,
                    format!("HTTP {} {} ({}): {}", status, code.code(), code.name(), detail),
                    retry_after_ms,
                )
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[async_trait]
impl BackendAdapter for HttpAdapter {
    fn backend_id(&self) -> &str {
        &self.settings.backend_id
    }

    fn model_id(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &Prompt<'_>) -> Result<String> {
        let model = prompt.model_or(&self.settings.model).to_string();
        let request = self.driver.build_request(prompt, &self.settings);
        let started = Instant::now();

        let body = self
            .transport
            .post_json(&request.path, &request.headers, &request.body)
            .await
            .map_err(|f| self.failure(&model, f))?;

        debug!(
            backend_id = %self.settings.backend_id,
            model_id = %model,
            duration_ms = started.elapsed().as_millis() as u64,
            "backend responded"
        );

        self.driver.parse_response(&body).map_err(|msg| {
            Error::backend(
                FailureClass::Fatal,
                self.settings.backend_id.as_str(),
                model.as_str(),
                format!("unusable response: {}", msg),
                None,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_fails_fast() {
        let err = HttpAdapter::for_kind(
            BackendKind::Anthropic,
            AdapterSettings::for_kind(BackendKind::Anthropic),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let adapter =
            HttpAdapter::for_kind(BackendKind::Ollama, AdapterSettings::for_kind(BackendKind::Ollama))
                .unwrap();
        assert_eq!(adapter.backend_id(), "ollama");
        assert_eq!(adapter.model_id(), "llama3.1");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
