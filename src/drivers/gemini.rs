//! Google Gemini generateContent driver.
//!
//! The model is part of the URL path, the system text goes into
//! `systemInstruction`, and generation options live under `generationConfig`.

use serde_json::{json, Map, Value};

use super::{AdapterSettings, DriverRequest, ProviderDriver};
use crate::types::Prompt;

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiDriver;

impl ProviderDriver for GeminiDriver {
    fn build_request(&self, prompt: &Prompt<'_>, settings: &AdapterSettings) -> DriverRequest {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt.user_text() }],
            }],
        });
        let system = prompt.system_text();
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let mut generation = Map::new();
        if let Some(t) = settings.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(n) = settings.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(n));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        let mut headers = Vec::new();
        if let Some(key) = &settings.api_key {
            headers.push(("x-goog-api-key".to_string(), key.clone()));
        }

        DriverRequest {
            path: format!("/models/{}:generateContent", prompt.model_or(&settings.model)),
            headers,
            body,
        }
    }

    fn parse_response(&self, body: &Value) -> Result<String, String> {
        let parts = body
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| match body.pointer("/promptFeedback/blockReason") {
                Some(reason) => format!("prompt blocked: {}", reason),
                None => "response has no candidates".to_string(),
            })?;
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        if text.is_empty() {
            Err("candidate has no text parts".to_string())
        } else {
            Ok(text)
        }
    }

    fn error_code(&self, body: &Value) -> Option<String> {
        body.pointer("/error/status")
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
    fn test_model_in_path() {
        let request = Request::new("gemini", "gemini-1.5-pro").with_payload("x");
        let settings = AdapterSettings::for_kind(BackendKind::Gemini)
            .with_api_key("g")
            .with_max_tokens(256);
        let req = GeminiDriver.build_request(&request.prompt(), &settings);
        assert_eq!(req.path, "/models/gemini-1.5-pro:generateContent");
        assert!(req.body.get("systemInstruction").is_none());
        assert_eq!(req.body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(req.headers, vec![("x-goog-api-key".to_string(), "g".to_string())]);
    }

    #[test]
    fn test_blocked_prompt() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiDriver.parse_response(&body).unwrap_err();
        assert!(err.contains("SAFETY"));
    }

    #[test]
    fn test_error_status() {
        let body = json!({"error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "quota"}});
        assert_eq!(GeminiDriver.error_code(&body).as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert_eq!(GeminiDriver.error_message(&body).as_deref(), Some("quota"));
    }
}
