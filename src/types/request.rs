//! LLM request value and the prompt view adapters consume.

use serde::{Deserialize, Serialize};

use super::message::Message;

const ADDITIONAL_INSTRUCTIONS_HEADING: &str = "**Additional instructions**:";

/// An immutable LLM request.
///
/// Every field takes part in the request's fingerprint, including the backend
/// and model identifiers: a cached answer belongs to the model that produced it.
/// Fields may be empty but are never absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    role: String,
    context: String,
    instructions: String,
    payload: String,
    additional_instructions: String,
    backend_id: String,
    model_id: String,
}

impl Request {
    pub fn new(backend_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            role: String::new(),
            context: String::new(),
            instructions: String::new(),
            payload: String::new(),
            additional_instructions: String::new(),
            backend_id: backend_id.into(),
            model_id: model_id.into(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_additional_instructions(mut self, text: impl Into<String>) -> Self {
        self.additional_instructions = text.into();
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn additional_instructions(&self) -> &str {
        &self.additional_instructions
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Fields in fingerprint order. The order is part of the cache format.
    pub fn canonical_fields(&self) -> [(&'static str, &str); 7] {
        [
            ("role", &self.role),
            ("context", &self.context),
            ("instructions", &self.instructions),
            ("payload", &self.payload),
            ("additional_instructions", &self.additional_instructions),
            ("backend_id", &self.backend_id),
            ("model_id", &self.model_id),
        ]
    }

    pub fn prompt(&self) -> Prompt<'_> {
        Prompt {
            role: &self.role,
            context: &self.context,
            instructions: &self.instructions,
            payload: &self.payload,
            additional_instructions: &self.additional_instructions,
            model_id: &self.model_id,
        }
    }
}

/// What a backend adapter needs to issue one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prompt<'a> {
    pub role: &'a str,
    pub context: &'a str,
    pub instructions: &'a str,
    pub payload: &'a str,
    pub additional_instructions: &'a str,
    pub model_id: &'a str,
}

impl<'a> Prompt<'a> {
    /// Requested model, or `default` when the request leaves it empty.
    pub fn model_or<'b>(&self, default: &'b str) -> &'b str
    where
        'a: 'b,
    {
        if self.model_id.trim().is_empty() {
            default
        } else {
            self.model_id
        }
    }

    /// System text: the assistant role.
    pub fn system_text(&self) -> &'a str {
        self.role.trim()
    }

    /// User text: context, instructions, payload and any additional
    /// instructions, separated by blank lines. Empty parts are skipped.
    pub fn user_text(&self) -> String {
        let additional = self.additional_instructions.trim();
        let additional = if additional.is_empty() {
            String::new()
        } else {
            format!("{}\n\n{}", ADDITIONAL_INSTRUCTIONS_HEADING, additional)
        };

        [
            self.context.trim(),
            self.instructions.trim(),
            self.payload.trim(),
            additional.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    /// Chat messages for chat-style backends; the system message is omitted
    /// when there is no role.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        let system = self.system_text();
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(self.user_text()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    #[test]
    fn test_user_text_skips_empty_parts() {
        let request = Request::new("openai", "gpt-4o")
            .with_context("  Platform: Drupal 10  ")
            .with_payload("Cart total wrong");
        assert_eq!(
            request.prompt().user_text(),
            "Platform: Drupal 10\n\nCart total wrong"
        );
    }

    #[test]
    fn test_additional_instructions_get_heading() {
        let request = Request::new("openai", "gpt-4o")
            .with_instructions("Classify.")
            .with_additional_instructions("Answer in Spanish.");
        let text = request.prompt().user_text();
        assert!(text.starts_with("Classify.\n\n**Additional instructions**:"));
        assert!(text.ends_with("Answer in Spanish."));
    }

    #[test]
    fn test_messages_without_role() {
        let request = Request::new("ollama", "llama3").with_payload("hi");
        let messages = request.prompt().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[test]
    fn test_model_or_default() {
        let request = Request::new("openai", "");
        assert_eq!(request.prompt().model_or("gpt-4o-mini"), "gpt-4o-mini");
        let request = Request::new("openai", "gpt-4o");
        assert_eq!(request.prompt().model_or("gpt-4o-mini"), "gpt-4o");
    }
}
