//! Writes classification results, totals and the insights report to disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::classify::ClassifiedIncident;
use crate::config::{CsvSettings, ExportSettings};
use crate::summary::{DimensionCounts, Summary};
use crate::{Error, ErrorContext, Result};

pub const PROCESSED_FILE: &str = "processed-data";
pub const TOTALS_FILE: &str = "totals";
pub const TOTALS_BY_DATE_FILE: &str = "totals-by-date";
pub const INSIGHTS_FILE: &str = "insights.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(Error::configuration_with_context(
                format!("unsupported export format '{}'", other),
                ErrorContext::new()
                    .with_field_path("export.format")
                    .with_details("expected csv or json"),
            )),
        }
    }
}

/// `{"children": {label: count}, "total": n}` as written to the JSON totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct CategoryTotals<'a> {
    children: &'a BTreeMap<String, u64>,
    total: u64,
}

fn category_totals(counts: &DimensionCounts) -> BTreeMap<&str, CategoryTotals<'_>> {
    counts
        .iter()
        .map(|(dimension, labels)| {
            (
                dimension.as_str(),
                CategoryTotals {
                    children: labels,
                    total: labels.values().sum(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Exporter {
    format: ExportFormat,
    dir: PathBuf,
    delimiter: u8,
    quote: u8,
}

impl Exporter {
    pub fn new(format: ExportFormat, dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            dir: dir.into(),
            delimiter: b',',
            quote: b'"',
        }
    }

    /// Exporter for `export`, reusing the input CSV dialect for CSV output.
    pub fn from_settings(export: &ExportSettings, csv: &CsvSettings) -> Result<Self> {
        Ok(Self::new(export.format, export.target_dir())
            .with_delimiter(csv.delimiter_byte()?)
            .with_quote(csv.quote_byte()?))
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    fn path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, self.format.extension()))
    }

    /// Writes every output file and returns their paths: processed data,
    /// totals, totals by date, insights.
    pub fn export(
        &self,
        incidents: &[ClassifiedIncident],
        summary: &Summary,
        insights: &str,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)?;
        let paths = vec![
            self.path(PROCESSED_FILE),
            self.path(TOTALS_FILE),
            self.path(TOTALS_BY_DATE_FILE),
            self.dir.join(INSIGHTS_FILE),
        ];

        match self.format {
            ExportFormat::Csv => {
                self.write_processed_csv(&paths[0], incidents)?;
                self.write_totals_csv(&paths[1], &summary.totals)?;
                self.write_totals_by_date_csv(&paths[2], &summary.totals_by_month)?;
            }
            ExportFormat::Json => {
                write_json(&paths[0], &incidents)?;
                write_json(&paths[1], &category_totals(&summary.totals))?;
                let by_date: BTreeMap<&str, _> = summary
                    .totals_by_month
                    .iter()
                    .map(|(month, counts)| (month.as_str(), category_totals(counts)))
                    .collect();
                write_json(&paths[2], &by_date)?;
            }
        }
        fs::write(&paths[3], insights)?;

        info!(dir = %self.dir.display(), format = %self.format, files = paths.len(), "export written");
        Ok(paths)
    }

    fn csv_writer(&self, path: &Path) -> Result<csv::Writer<fs::File>> {
        Ok(csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_path(path)?)
    }

    fn write_processed_csv(&self, path: &Path, incidents: &[ClassifiedIncident]) -> Result<()> {
        let mut w = self.csv_writer(path)?;
        w.write_record(ClassifiedIncident::CSV_HEADERS)?;
        for incident in incidents {
            w.write_record(incident.csv_record())?;
        }
        w.flush()?;
        Ok(())
    }

    fn write_totals_csv(&self, path: &Path, totals: &DimensionCounts) -> Result<()> {
        let mut w = self.csv_writer(path)?;
        w.write_record(["Category", "Subcategory", "Count"])?;
        for (dimension, labels) in totals {
            for (label, count) in labels {
                w.write_record([dimension.as_str(), label.as_str(), count.to_string().as_str()])?;
            }
        }
        w.flush()?;
        Ok(())
    }

    fn write_totals_by_date_csv(
        &self,
        path: &Path,
        by_month: &BTreeMap<String, DimensionCounts>,
    ) -> Result<()> {
        let mut w = self.csv_writer(path)?;
        w.write_record(["Date", "Category", "Subcategory", "Count"])?;
        for (month, totals) in by_month {
            for (dimension, labels) in totals {
                for (label, count) in labels {
                    w.write_record([
                        month.as_str(),
                        dimension.as_str(),
                        label.as_str(),
                        count.to_string().as_str(),
                    ])?;
                }
            }
        }
        w.flush()?;
        Ok(())
    }
}

/// Pretty JSON with four-space indentation.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path)?;
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(std::io::BufWriter::new(file), formatter);
    value.serialize(&mut ser)?;
    ser.into_inner().flush()?;
    Ok(())
}
