use crate::config::{Config, TaxonomySettings};
use crate::ingest::Incident;
use crate::types::Request;
use crate::Result;

const TASK: &str = "\
**Task**: classify the incident below along three dimensions. For each one pick a \
main category and, where it applies, a subcategory.

1. Technological component:
```
{technological_component}
```
2. Functional area:
```
{functional_area}
```
3. Problem type:
```
{problem_type}
```

An incident has a subject and a description. Use the platform context to resolve \
aliases and secondary systems. When the incident is ambiguous, make a reasoned \
assumption and explain it in `notes`. Use \"N/A\" for a subcategory that does not apply.

Answer with a JSON object of exactly this shape:
{
    \"technological_component\": \"...\",
    \"technological_component_subcategory\": \"...\",
    \"functional_area\": \"...\",
    \"functional_area_subcategory\": \"...\",
    \"problem_type\": \"...\",
    \"problem_type_subcategory\": \"...\",
    \"notes\": \"...\"
}";

const RESPONSE_INSTRUCTIONS: &str = "\
**Response instructions**:
- Reply with the JSON object only.
- Do not wrap it in code fences and do not add any text before or after it.";

/// Builds the per-incident classification request.
#[derive(Debug, Clone)]
pub struct ProcessingPromptBuilder {
    backend_id: String,
    model_id: String,
    role: String,
    context: String,
    taxonomy: TaxonomySettings,
    additional_instructions: String,
}

impl ProcessingPromptBuilder {
    pub fn new(backend_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let assistant = crate::config::AssistantSettings::default();
        Self {
            backend_id: backend_id.into(),
            model_id: model_id.into(),
            role: assistant.processing_role,
            context: assistant.processing_context,
            taxonomy: TaxonomySettings::default(),
            additional_instructions: String::new(),
        }
    }

    /// Fails when the configured backend id is unknown.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend_id = config.backend_id()?;
        Ok(Self {
            backend_id: backend_id.to_string(),
            model_id: config.model_for(backend_id),
            role: config.assistant.processing_role.clone(),
            context: config.assistant.processing_context.clone(),
            taxonomy: config.taxonomy.clone(),
            additional_instructions: config.assistant.processing_additional_instructions.clone(),
        })
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: TaxonomySettings) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn with_additional_instructions(mut self, text: impl Into<String>) -> Self {
        self.additional_instructions = text.into();
        self
    }

    fn instructions(&self) -> String {
        let task = TASK
            .replace("{technological_component}", self.taxonomy.technological_component.trim())
            .replace("{functional_area}", self.taxonomy.functional_area.trim())
            .replace("{problem_type}", self.taxonomy.problem_type.trim());
        format!("{}\n\n{}", task, RESPONSE_INSTRUCTIONS)
    }

    pub fn build(&self, incident: &Incident) -> Request {
        let context = if self.context.trim().is_empty() {
            String::new()
        } else {
            format!("**Platform context**:\n{}", self.context.trim())
        };
        let payload = format!(
            "**Incident**:\n- Subject:\n```\n{}\n```\n- Description:\n```\n{}\n```",
            incident.subject.trim(),
            incident.description.trim()
        );

        Request::new(self.backend_id.as_str(), self.model_id.as_str())
            .with_role(self.role.trim())
            .with_context(context)
            .with_instructions(self.instructions())
            .with_payload(payload)
            .with_additional_instructions(self.additional_instructions.trim())
    }
}
