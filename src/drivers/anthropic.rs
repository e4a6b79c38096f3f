//! Anthropic Messages API 驱动
//!
//! Anthropic Messages API driver. Differences from the OpenAI shape:
//! - the system text is a top-level `system` parameter, not a message;
//! - the reply is a list of typed content blocks;
//! - `max_tokens` is mandatory;
//! - authentication uses `x-api-key` plus a pinned `anthropic-version`.

use serde_json::{json, Value};

use super::{insert_opt, AdapterSettings, DriverRequest, ProviderDriver};
use crate::types::Prompt;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicDriver;

impl ProviderDriver for AnthropicDriver {
    fn build_request(&self, prompt: &Prompt<'_>, settings: &AdapterSettings) -> DriverRequest {
        let mut body = json!({
            "model": prompt.model_or(&settings.model),
            "max_tokens": settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{
                "role": "user",
                "content": [{ "type": "text", "text": prompt.user_text() }],
            }],
        });
        let system = prompt.system_text();
        if !system.is_empty() {
            body["system"] = Value::String(system.to_string());
        }
        insert_opt(&mut body, "temperature", settings.temperature);

        let mut headers = vec![("anthropic-version".to_string(), API_VERSION.to_string())];
        if let Some(key) = &settings.api_key {
            headers.push(("x-api-key".to_string(), key.clone()));
        }

        DriverRequest {
            path: "/messages".to_string(),
            headers,
            body,
        }
    }

    fn parse_response(&self, body: &Value) -> Result<String, String> {
        let blocks = body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| "response has no content blocks".to_string())?;
        let text: Vec<&str> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        if text.is_empty() {
            return Err("response has no text block".to_string());
        }
        Ok(text.concat())
    }

    fn error_code(&self, body: &Value) -> Option<String> {
        body.pointer("/error/type")
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::BackendKind;
    use crate::types::Request;

    #[test]
    fn test_system_is_top_level() {
        let request = Request::new("anthropic", "claude-3-haiku")
            .with_role("You are a QA analyst.")
            .with_payload("Search returns nothing");
        let settings = AdapterSettings::for_kind(BackendKind::Anthropic).with_api_key("k");
        let req = AnthropicDriver.build_request(&request.prompt(), &settings);

        assert_eq!(req.path, "/messages");
        assert_eq!(req.body["system"], "You are a QA analyst.");
        assert_eq!(req.body["model"], "claude-3-haiku");
        assert_eq!(req.body["max_tokens"], 4096);
        assert_eq!(req.body["messages"].as_array().unwrap().len(), 1);
        assert!(req.headers.contains(&("x-api-key".to_string(), "k".to_string())));
        assert!(req
            .headers
            .contains(&("anthropic-version".to_string(), "2023-06-01".to_string())));
    }

    #[test]
    fn test_parse_joins_text_blocks() {
        let body = json!({
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "1}"}
            ]
        });
        assert_eq!(AnthropicDriver.parse_response(&body).unwrap(), "{\"a\":1}");
        assert!(AnthropicDriver.parse_response(&json!({"content": []})).is_err());
    }
}
