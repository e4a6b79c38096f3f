//! Totals per taxonomy dimension, overall and per month.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classify::{Classification, ClassifiedIncident};
use crate::{Error, ErrorContext, Result};

/// Label used when the model left a dimension empty.
pub const UNKNOWN_LABEL: &str = "Unknown";

const CHANGED_FORMAT: &str = "%d/%b/%y %I:%M %p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    TechnologicalComponent,
    TechnologicalComponentSubcategory,
    FunctionalArea,
    FunctionalAreaSubcategory,
    ProblemType,
    ProblemTypeSubcategory,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::TechnologicalComponent,
        Dimension::TechnologicalComponentSubcategory,
        Dimension::FunctionalArea,
        Dimension::FunctionalAreaSubcategory,
        Dimension::ProblemType,
        Dimension::ProblemTypeSubcategory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechnologicalComponent => "technological_component",
            Self::TechnologicalComponentSubcategory => "technological_component_subcategory",
            Self::FunctionalArea => "functional_area",
            Self::FunctionalAreaSubcategory => "functional_area_subcategory",
            Self::ProblemType => "problem_type",
            Self::ProblemTypeSubcategory => "problem_type_subcategory",
        }
    }

    pub fn label<'a>(&self, c: &'a Classification) -> Option<&'a str> {
        let value = match self {
            Self::TechnologicalComponent => &c.technological_component,
            Self::TechnologicalComponentSubcategory => &c.technological_component_subcategory,
            Self::FunctionalArea => &c.functional_area,
            Self::FunctionalAreaSubcategory => &c.functional_area_subcategory,
            Self::ProblemType => &c.problem_type,
            Self::ProblemTypeSubcategory => &c.problem_type_subcategory,
        };
        value.as_deref()
    }
}

/// Which dimensions are counted. A subcategory is only counted when its
/// parent dimension is enabled too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionToggles {
    pub technological_component: bool,
    pub technological_component_subcategory: bool,
    pub functional_area: bool,
    pub functional_area_subcategory: bool,
    pub problem_type: bool,
    pub problem_type_subcategory: bool,
}

impl Default for DimensionToggles {
    fn default() -> Self {
        Self {
            technological_component: false,
            technological_component_subcategory: false,
            functional_area: true,
            functional_area_subcategory: false,
            problem_type: false,
            problem_type_subcategory: false,
        }
    }
}

impl DimensionToggles {
    pub fn all() -> Self {
        Self {
            technological_component: true,
            technological_component_subcategory: true,
            functional_area: true,
            functional_area_subcategory: true,
            problem_type: true,
            problem_type_subcategory: true,
        }
    }

    pub fn enabled(&self) -> Vec<Dimension> {
        let pairs = [
            (
                self.technological_component,
                self.technological_component_subcategory,
                Dimension::TechnologicalComponent,
                Dimension::TechnologicalComponentSubcategory,
            ),
            (
                self.functional_area,
                self.functional_area_subcategory,
                Dimension::FunctionalArea,
                Dimension::FunctionalAreaSubcategory,
            ),
            (
                self.problem_type,
                self.problem_type_subcategory,
                Dimension::ProblemType,
                Dimension::ProblemTypeSubcategory,
            ),
        ];
        let mut out = Vec::new();
        for (parent_on, sub_on, parent, sub) in pairs {
            if parent_on {
                out.push(parent);
                if sub_on {
                    out.push(sub);
                }
            }
        }
        out
    }
}

/// Label counts per dimension name.
pub type DimensionCounts = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub totals: DimensionCounts,
    /// Keyed by `YYYY-MM`.
    pub totals_by_month: BTreeMap<String, DimensionCounts>,
}

#[derive(Debug, Clone)]
pub struct Summarizer {
    dimensions: Vec<Dimension>,
}

impl Summarizer {
    pub fn new(toggles: DimensionToggles) -> Self {
        Self {
            dimensions: toggles.enabled(),
        }
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    fn empty_counts(&self) -> DimensionCounts {
        self.dimensions
            .iter()
            .map(|d| (d.as_str().to_string(), BTreeMap::new()))
            .collect()
    }

    fn count_into(&self, counts: &mut DimensionCounts, c: &Classification) {
        for dim in &self.dimensions {
            let label = dim
                .label(c)
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(UNKNOWN_LABEL);
            *counts
                .entry(dim.as_str().to_string())
                .or_default()
                .entry(label.to_string())
                .or_insert(0) += 1;
        }
    }

    pub fn summarize(&self, incidents: &[ClassifiedIncident]) -> Result<Summary> {
        let mut summary = Summary {
            totals: self.empty_counts(),
            totals_by_month: BTreeMap::new(),
        };
        for incident in incidents {
            let month = month_of(&incident.changed).map_err(|e| match e {
                Error::Input { message, context } => Error::Input {
                    message: format!("incident '{}': {}", incident.subject, message),
                    context,
                },
                other => other,
            })?;
            self.count_into(&mut summary.totals, &incident.classification);
            let by_month = summary
                .totals_by_month
                .entry(month)
                .or_insert_with(|| self.empty_counts());
            self.count_into(by_month, &incident.classification);
        }
        Ok(summary)
    }
}

fn english_month(token: &str) -> Option<&'static str> {
    let month = match token.to_ascii_lowercase().as_str() {
        "ene" | "jan" => "Jan",
        "feb" => "Feb",
        "mar" => "Mar",
        "abr" | "apr" => "Apr",
        "may" => "May",
        "jun" => "Jun",
        "jul" => "Jul",
        "ago" | "aug" => "Aug",
        "sep" | "sept" => "Sep",
        "oct" => "Oct",
        "nov" => "Nov",
        "dic" | "dec" => "Dec",
        _ => return None,
    };
    Some(month)
}

/// `YYYY-MM` of a `dd/Mon/yy hh:mm AM/PM` timestamp. Spanish month
/// abbreviations (`ene`, `abr`, `ago`, `dic`, ...) are accepted.
pub fn month_of(changed: &str) -> Result<String> {
    let normalized = changed.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut parts: Vec<String> = normalized.splitn(3, '/').map(String::from).collect();
    if let Some(month) = parts.get_mut(1) {
        if let Some(en) = english_month(month.trim_end_matches('.')) {
            *month = en.to_string();
        }
    }
    let candidate = parts.join("/");

    NaiveDateTime::parse_from_str(&candidate, CHANGED_FORMAT)
        .map(|dt| dt.format("%Y-%m").to_string())
        .map_err(|e| {
            Error::input_with_context(
                format!("cannot parse date '{}'", changed.trim()),
                ErrorContext::new()
                    .with_field_path("changed")
                    .with_details(format!("expected dd/Mon/yy hh:mm AM/PM ({})", e))
                    .with_source("summarizer"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident(changed: &str, area: Option<&str>, sub: Option<&str>) -> ClassifiedIncident {
        ClassifiedIncident {
            classification: Classification {
                functional_area: area.map(String::from),
                functional_area_subcategory: sub.map(String::from),
                ..Default::default()
            },
            subject: "s".into(),
            description: "d".into(),
            changed: changed.into(),
        }
    }

    #[test]
    fn test_month_of() {
        assert_eq!(month_of("05/Mar/24 09:15 AM").unwrap(), "2024-03");
        assert_eq!(month_of("12/ene/24 10:30 PM").unwrap(), "2024-01");
        assert_eq!(month_of(" 01/dic/23   11:59  PM ").unwrap(), "2023-12");
        assert_eq!(month_of("20/ago/24 1:05 AM").unwrap(), "2024-08");
        let err = month_of("2024-03-05").unwrap_err();
        assert_eq!(err.kind(), "input");
    }

    #[test]
    fn test_toggles_require_parent() {
        let toggles = DimensionToggles {
            functional_area: false,
            functional_area_subcategory: true,
            problem_type: true,
            problem_type_subcategory: true,
            ..Default::default()
        };
        assert_eq!(
            toggles.enabled(),
            vec![Dimension::ProblemType, Dimension::ProblemTypeSubcategory]
        );
    }

    #[test]
    fn test_summarize_counts_unknown_and_months() {
        let toggles = DimensionToggles {
            functional_area_subcategory: true,
            ..Default::default()
        };
        let incidents = vec![
            incident("05/Mar/24 09:15 AM", Some("Checkout"), Some("Payment")),
            incident("06/mar/24 10:00 AM", Some("Checkout"), None),
            incident("01/abr/24 10:00 AM", None, Some("  ")),
        ];
        let summary = Summarizer::new(toggles).summarize(&incidents).unwrap();

        let areas = &summary.totals["functional_area"];
        assert_eq!(areas["Checkout"], 2);
        assert_eq!(areas[UNKNOWN_LABEL], 1);
        assert_eq!(summary.totals["functional_area_subcategory"][UNKNOWN_LABEL], 2);
        assert!(!summary.totals.contains_key("problem_type"));

        assert_eq!(
            summary.totals_by_month.keys().collect::<Vec<_>>(),
            vec!["2024-03", "2024-04"]
        );
        assert_eq!(summary.totals_by_month["2024-03"]["functional_area"]["Checkout"], 2);
    }

    #[test]
    fn test_bad_date_names_incident() {
        let err = Summarizer::new(DimensionToggles::default())
            .summarize(&[incident("yesterday", Some("Search"), None)])
            .unwrap_err();
        assert!(err.to_string().contains("incident 's'"));
    }
}
