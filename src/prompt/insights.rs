use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::summary::{DimensionCounts, Summary};
use crate::types::Request;
use crate::Result;

/// Categories kept per month and dimension in the digest.
pub const HIGHLIGHTS_PER_DIMENSION: usize = 5;

const TASK: &str = "\
**Task**: analyse the monthly incident statistics in the payload as a whole and \
produce a global overview. Do not break the analysis down by period.

Cover:
1. Technological components with the highest concentration of incidents and \
their recurring subcategories.
2. Functional areas most frequently affected, especially business-critical ones.
3. The most common problem types and how they depend on each other.
4. Relationships between components and functional areas, and whether labels \
such as \"N/A\" or \"Unknown\" point at reporting gaps.
5. Chronic problem areas, visible improvements or declines, and likely root causes.
6. Prioritised, actionable recommendations.";

/// Per-dimension total plus its largest categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDigest {
    pub total: u64,
    pub highlights: BTreeMap<String, u64>,
}

/// Month → dimension → digest.
pub type SummaryDigest = BTreeMap<String, BTreeMap<String, DimensionDigest>>;

fn digest_counts(counts: &DimensionCounts) -> BTreeMap<String, DimensionDigest> {
    counts
        .iter()
        .map(|(dimension, labels)| {
            let mut ranked: Vec<(&String, &u64)> = labels.iter().collect();
            // Stable sort keeps label order among equal counts.
            ranked.sort_by(|a, b| b.1.cmp(a.1));
            let highlights = ranked
                .into_iter()
                .take(HIGHLIGHTS_PER_DIMENSION)
                .map(|(l, c)| (l.clone(), *c))
                .collect();
            (
                dimension.clone(),
                DimensionDigest {
                    total: labels.values().sum(),
                    highlights,
                },
            )
        })
        .collect()
}

/// Shrinks the monthly totals to what the insights prompt needs.
pub fn preprocess_summary(summary: &Summary) -> SummaryDigest {
    summary
        .totals_by_month
        .iter()
        .map(|(month, counts)| (month.clone(), digest_counts(counts)))
        .collect()
}

/// Builds the request for the global insights report.
#[derive(Debug, Clone)]
pub struct InsightsPromptBuilder {
    backend_id: String,
    model_id: String,
    role: String,
    context: String,
}

impl InsightsPromptBuilder {
    pub fn new(backend_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let assistant = crate::config::AssistantSettings::default();
        Self {
            backend_id: backend_id.into(),
            model_id: model_id.into(),
            role: assistant.insights_role,
            context: assistant.insights_context,
        }
    }

    /// Fails when the configured backend id is unknown.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend_id = config.backend_id()?;
        Ok(Self {
            backend_id: backend_id.to_string(),
            model_id: config.model_for(backend_id),
            role: config.assistant.insights_role.clone(),
            context: config.assistant.insights_context.clone(),
        })
    }

    pub fn build(&self, digest: &SummaryDigest, language: &str) -> Result<Request> {
        let data = serde_json::to_string_pretty(digest)?;
        let instructions = format!(
            "{}\n\n**Response instructions**:\n- Write the whole report in \"{}\".\n\
             - Do not wrap the report in code fences.",
            TASK,
            language.trim()
        );
        let context = if self.context.trim().is_empty() {
            String::new()
        } else {
            format!("**Platform context**:\n{}", self.context.trim())
        };

        Ok(Request::new(self.backend_id.as_str(), self.model_id.as_str())
            .with_role(self.role.trim())
            .with_context(context)
            .with_instructions(instructions)
            .with_payload(format!("**Input data**:\n```json\n{}\n```", data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> Summary {
        let mut march = DimensionCounts::new();
        march.insert(
            "functional_area".into(),
            [
                ("Checkout", 9u64),
                ("Search", 7),
                ("Cart", 5),
                ("Pricing", 5),
                ("Catalog", 3),
                ("Logistics", 1),
                ("Banners", 1),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
        );
        let mut summary = Summary::default();
        summary.totals_by_month.insert("2024-03".into(), march);
        summary
    }

    #[test]
    fn test_preprocess_keeps_top_five_and_total() {
        let digest = preprocess_summary(&summary());
        let area = &digest["2024-03"]["functional_area"];
        assert_eq!(area.total, 31);
        assert_eq!(area.highlights.len(), 5);
        assert!(area.highlights.contains_key("Checkout"));
        assert!(area.highlights.contains_key("Catalog"));
        assert!(!area.highlights.contains_key("Logistics"));
    }

    #[test]
    fn test_build_embeds_digest_and_language() {
        let digest = preprocess_summary(&summary());
        let request = InsightsPromptBuilder::new("openai", "gpt-4o")
            .build(&digest, "Spanish")
            .unwrap();
        assert!(request.payload().contains("\"2024-03\""));
        assert!(request.payload().contains("\"highlights\""));
        assert!(request.instructions().contains("\"Spanish\""));
        assert_eq!(request.backend_id(), "openai");
    }
}
