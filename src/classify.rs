//! Per-incident classification through the mediator.
//!
//! Each [`Incident`] becomes one processing request. The model's reply is
//! parsed into a [`Classification`] and merged with the incident fields.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::ingest::Incident;
use crate::mediator::Mediator;
use crate::prompt::ProcessingPromptBuilder;
use crate::{Error, ErrorContext, Result};

/// Labels the model assigned to one incident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    pub technological_component: Option<String>,
    pub technological_component_subcategory: Option<String>,
    pub functional_area: Option<String>,
    pub functional_area_subcategory: Option<String>,
    pub problem_type: Option<String>,
    pub problem_type_subcategory: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedIncident {
    #[serde(flatten)]
    pub classification: Classification,
    pub subject: String,
    pub description: String,
    pub changed: String,
}

impl ClassifiedIncident {
    pub const CSV_HEADERS: [&'static str; 10] = [
        "technological_component",
        "technological_component_subcategory",
        "functional_area",
        "functional_area_subcategory",
        "problem_type",
        "problem_type_subcategory",
        "notes",
        "subject",
        "description",
        "changed",
    ];

    pub fn new(classification: Classification, incident: Incident) -> Self {
        Self {
            classification,
            subject: incident.subject,
            description: incident.description,
            changed: incident.changed,
        }
    }

    /// Values in [`Self::CSV_HEADERS`] order; absent labels are empty cells.
    pub fn csv_record(&self) -> [&str; 10] {
        let c = &self.classification;
        fn cell(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("")
        }
        [
            cell(&c.technological_component),
            cell(&c.technological_component_subcategory),
            cell(&c.functional_area),
            cell(&c.functional_area_subcategory),
            cell(&c.problem_type),
            cell(&c.problem_type_subcategory),
            cell(&c.notes),
            &self.subject,
            &self.description,
            &self.changed,
        ]
    }
}

/// Removes a surrounding ```` ```json ```` / ```` ``` ```` fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Parses a model reply into a [`Classification`].
pub fn parse_classification(text: &str) -> Result<Classification> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(cleaned).map_err(|e| {
        Error::input_with_context(
            format!("model reply is not a classification object: {}", e),
            ErrorContext::new()
                .with_details(cleaned.to_string())
                .with_source("classifier"),
        )
    })
}

/// Runs the processing prompt for every incident.
#[derive(Debug, Clone)]
pub struct Classifier {
    mediator: Arc<Mediator>,
    prompts: ProcessingPromptBuilder,
    concurrency: usize,
}

impl Classifier {
    pub fn new(mediator: Arc<Mediator>, prompts: ProcessingPromptBuilder) -> Self {
        Self {
            mediator,
            prompts,
            concurrency: 1,
        }
    }

    /// Maximum incidents in flight at once (at least one).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn classify_one(&self, incident: Incident) -> Result<ClassifiedIncident> {
        let request = self.prompts.build(&incident);
        let reply = self.mediator.invoke(&request).await?;
        let classification = parse_classification(&reply).map_err(|e| match e {
            Error::Input { message, context } => Error::Input {
                message: format!("incident '{}': {}", incident.subject, message),
                context,
            },
            other => other,
        })?;
        Ok(ClassifiedIncident::new(classification, incident))
    }

    /// Classifies all incidents. Output order matches input order; the first
    /// failure aborts the run.
    pub async fn classify(&self, incidents: Vec<Incident>) -> Result<Vec<ClassifiedIncident>> {
        let total = incidents.len();
        let results: Vec<Result<ClassifiedIncident>> =
            futures::stream::iter(incidents.into_iter().enumerate())
                .map(|(idx, incident)| async move {
                    info!("Processing item {}/{}", idx + 1, total);
                    self.classify_one(incident).await
                })
                .buffered(self.concurrency)
                .collect()
                .await;
        results.into_iter().collect()
    }
}
