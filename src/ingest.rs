//! CSV ingestion of incident reports.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::CsvSettings;
use crate::{Error, ErrorContext, Result};

/// One CSV row keyed by header.
pub type Row = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct CsvReader {
    path: PathBuf,
    delimiter: u8,
    quote: u8,
}

impl CsvReader {
    pub fn new(path: impl Into<PathBuf>, delimiter: u8, quote: u8) -> Self {
        Self {
            path: path.into(),
            delimiter,
            quote,
        }
    }

    pub fn from_settings(path: &Path, settings: &CsvSettings) -> Result<Self> {
        Ok(Self::new(path, settings.delimiter_byte()?, settings.quote_byte()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<csv::Reader<std::fs::File>> {
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| {
                let not_found = matches!(
                    e.kind(),
                    csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound
                );
                if not_found {
                    Error::input_with_context(
                        format!("input file {} not found", self.path.display()),
                        ErrorContext::new()
                            .with_field_path("csv.path")
                            .with_source("csv_reader"),
                    )
                } else {
                    Error::Csv(e)
                }
            })
    }

    pub fn headers(&self) -> Result<Vec<String>> {
        let mut reader = self.reader()?;
        Ok(reader.headers()?.iter().map(String::from).collect())
    }

    /// Every data row as a header → value map. Short rows leave the missing
    /// columns out of the map.
    pub fn read_all(&self) -> Result<Vec<Row>> {
        let mut reader = self.reader()?;
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            rows.push(row);
        }
        debug!(path = %self.path.display(), rows = rows.len(), "csv read");
        Ok(rows)
    }

    pub fn count_rows(&self) -> Result<usize> {
        Ok(self.reader()?.records().count())
    }
}

/// Column names holding the fields an [`Incident`] needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentHeaders {
    pub subject: String,
    pub changed: String,
    pub description: String,
}

impl From<&CsvSettings> for IncidentHeaders {
    fn from(s: &CsvSettings) -> Self {
        Self {
            subject: s.header_subject.clone(),
            changed: s.header_changed.clone(),
            description: s.header_description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub subject: String,
    /// Last-change timestamp as exported by the tracker, e.g. `05/mar/24 09:15 AM`.
    pub changed: String,
    pub description: String,
}

impl Incident {
    pub fn from_row(row: &Row, headers: &IncidentHeaders) -> Result<Self> {
        let field = |name: &str| -> Result<String> {
            row.get(name).cloned().ok_or_else(|| {
                Error::input_with_context(
                    format!("column '{}' missing from input row", name),
                    ErrorContext::new()
                        .with_field_path(name)
                        .with_source("csv_reader"),
                )
            })
        };
        Ok(Self {
            subject: field(&headers.subject)?,
            changed: field(&headers.changed)?,
            description: field(&headers.description)?,
        })
    }
}

/// Reads the configured CSV and extracts every incident.
pub fn load_incidents(path: &Path, settings: &CsvSettings) -> Result<Vec<Incident>> {
    let headers = IncidentHeaders::from(settings);
    CsvReader::from_settings(path, settings)?
        .read_all()?
        .iter()
        .map(|row| Incident::from_row(row, &headers))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_all_with_custom_delimiter() {
        let file = write_csv("Summary;Updated;Description\n\"Cart; empty\";05/mar/24 09:15 AM;Items vanish\n");
        let reader = CsvReader::new(file.path(), b';', b'"');
        assert_eq!(reader.headers().unwrap(), vec!["Summary", "Updated", "Description"]);
        let rows = reader.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Summary"], "Cart; empty");
        assert_eq!(reader.count_rows().unwrap(), 1);
    }

    #[test]
    fn test_load_incidents() {
        let file = write_csv("Summary,Updated,Description,Key\nLogin fails,01/ene/24 08:00 AM,500 on submit,BUG-1\n");
        let incidents = load_incidents(file.path(), &CsvSettings::default()).unwrap();
        assert_eq!(
            incidents,
            vec![Incident {
                subject: "Login fails".into(),
                changed: "01/ene/24 08:00 AM".into(),
                description: "500 on submit".into(),
            }]
        );
    }

    #[test]
    fn test_missing_column_is_input_error() {
        let file = write_csv("Summary,Description\nx,y\n");
        let err = load_incidents(file.path(), &CsvSettings::default()).unwrap_err();
        assert_eq!(err.kind(), "input");
        assert!(err.to_string().contains("Updated"));
    }

    #[test]
    fn test_missing_file() {
        let err = CsvReader::new("/nonexistent/bugs.csv", b',', b'"')
            .read_all()
            .unwrap_err();
        assert_eq!(err.kind(), "input");
    }
}
