//! Ollama chat driver for locally hosted models.

use serde_json::{json, Map, Value};

use super::{AdapterSettings, DriverRequest, ProviderDriver};
use crate::types::Prompt;

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaDriver;

impl ProviderDriver for OllamaDriver {
    fn build_request(&self, prompt: &Prompt<'_>, settings: &AdapterSettings) -> DriverRequest {
        let mut body = json!({
            "model": prompt.model_or(&settings.model),
            "messages": prompt.messages(),
            "stream": false,
        });

        let mut options = Map::new();
        if let Some(t) = settings.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(n) = settings.max_tokens {
            options.insert("num_predict".into(), json!(n));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        // A reverse proxy in front of the server may still want a token.
        let mut headers = Vec::new();
        if let Some(key) = &settings.api_key {
            headers.push(("authorization".to_string(), format!("Bearer {}", key)));
        }

        DriverRequest {
            path: "/api/chat".to_string(),
            headers,
            body,
        }
    }

    fn parse_response(&self, body: &Value) -> Result<String, String> {
        if let Some(err) = body.get("error").and_then(|e| e.as_str()) {
            return Err(err.to_string());
        }
        body.pointer("/message/content")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| "response has no message.content".to_string())
    }

    // Ollama reports errors as `{"error": "..."}` with no code.
    fn error_code(&self, _body: &Value) -> Option<String> {
        None
    }

    fn error_message(&self, body: &Value) -> Option<String> {
        body.get("error")
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
    fn test_non_streaming_body() {
        let request = Request::new("ollama", "").with_payload("hello");
        let settings = AdapterSettings::for_kind(BackendKind::Ollama).with_temperature(0.2);
        let req = OllamaDriver.build_request(&request.prompt(), &settings);
        assert_eq!(req.path, "/api/chat");
        assert_eq!(req.body["stream"], false);
        assert_eq!(req.body["model"], "llama3.1");
        assert_eq!(req.body["options"]["temperature"], 0.2);
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_parse_response() {
        let body = json!({"message": {"role": "assistant", "content": "ok"}, "done": true});
        assert_eq!(OllamaDriver.parse_response(&body).unwrap(), "ok");
        let body = json!({"error": "model 'x' not found"});
        assert!(OllamaDriver.parse_response(&body).unwrap_err().contains("not found"));
    }
}
