//! Backend id → adapter resolution.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::drivers::{BackendAdapter, HttpAdapter};
use crate::{Error, ErrorContext, Result};

/// Owns the adapters built at startup and hands out shared handles.
///
/// There is no fallback: a request naming a backend that was not
/// registered is a configuration error.
#[derive(Debug, Clone, Default)]
pub struct ProviderSelector {
    adapters: BTreeMap<String, Arc<dyn BackendAdapter>>,
}

impl ProviderSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under its own backend id, replacing any previous one.
    pub fn with_adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.adapters
            .insert(adapter.backend_id().to_string(), adapter);
        self
    }

    /// Builds the adapter of the configured backend. Unknown ids and missing
    /// credentials fail here, before any request is made.
    pub fn from_config(config: &Config) -> Result<Self> {
        let kind = config.backend_kind()?;
        let settings = config.adapter_settings(kind);
        let adapter = HttpAdapter::for_kind(kind, settings)?;
        info!(
            backend_id = adapter.backend_id(),
            model_id = adapter.model_id(),
            base_url = %adapter.settings().base_url,
            "backend selected"
        );
        Ok(Self::new().with_adapter(Arc::new(adapter)))
    }

    pub fn resolve(&self, backend_id: &str) -> Result<Arc<dyn BackendAdapter>> {
        self.adapters.get(backend_id).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
            Error::configuration_with_context(
                format!("backend '{}' is not configured", backend_id),
                ErrorContext::new()
                    .with_field_path("backend")
                    .with_details(format!("configured backends: [{}]", known.join(", ")))
                    .with_source("provider_selector"),
            )
        })
    }

    pub fn backend_ids(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
