//! OpenAI Chat Completions driver, also used for xAI Grok, which speaks the
//! same protocol.

use serde_json::{json, Value};

use super::{insert_opt, AdapterSettings, DriverRequest, ProviderDriver};
use crate::types::Prompt;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiDriver;

impl ProviderDriver for OpenAiDriver {
    fn build_request(&self, prompt: &Prompt<'_>, settings: &AdapterSettings) -> DriverRequest {
        let mut body = json!({
            "model": prompt.model_or(&settings.model),
            "messages": prompt.messages(),
        });
        insert_opt(&mut body, "temperature", settings.temperature);
        insert_opt(&mut body, "max_tokens", settings.max_tokens);

        let mut headers = Vec::new();
        if let Some(key) = &settings.api_key {
            headers.push(("authorization".to_string(), format!("Bearer {}", key)));
        }

        DriverRequest {
            path: "/chat/completions".to_string(),
            headers,
            body,
        }
    }

    fn parse_response(&self, body: &Value) -> Result<String, String> {
        body.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| "response has no choices[0].message.content".to_string())
    }

    fn error_code(&self, body: &Value) -> Option<String> {
        ["/error/code", "/error/type"]
            .iter()
            .find_map(|p| body.pointer(p).and_then(|v| v.as_str()))
            .map(String::from)
    }
}
