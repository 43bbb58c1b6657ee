//! Completion reports
//!
//! Summarises where the values of a completed table came from, and keeps a
//! history of reports next to the completed tables.

use crate::error::{Error, Result};
use crate::schema::{TableKind, OWN_DATA, UNRESOLVED};
use crate::table::CompletedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Provenance summary of one assembled table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReport {
    /// When the table was assembled
    pub timestamp: DateTime<Utc>,
    /// Kind of table
    pub kind: TableKind,
    /// Countries requested
    pub countries: Vec<String>,
    /// Number of (country, year) units that produced rows
    pub work_units: usize,
    /// Total rows
    pub rows: usize,
    /// Row counts keyed by source label
    pub rows_by_source: BTreeMap<String, usize>,
    /// Rows no exemplar could fill
    pub unresolved: usize,
    /// Where the table was written, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl CompletionReport {
    /// Summarise a completed table
    pub fn from_records<K>(
        kind: TableKind,
        countries: &[String],
        records: &[CompletedRecord<K>],
    ) -> Self {
        let mut rows_by_source: BTreeMap<String, usize> = BTreeMap::new();
        let mut units: BTreeSet<(&str, i32)> = BTreeSet::new();
        for record in records {
            *rows_by_source
                .entry(record.source.label().to_string())
                .or_default() += 1;
            units.insert((record.country.as_str(), record.year));
        }

        Self {
            timestamp: Utc::now(),
            kind,
            countries: countries.to_vec(),
            work_units: units.len(),
            rows: records.len(),
            unresolved: records.iter().filter(|r| r.is_unresolved()).count(),
            rows_by_source,
            output: None,
        }
    }

    /// Record where the table was written
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Rows borrowed from exemplars
    pub fn borrowed(&self) -> usize {
        self.rows_by_source
            .iter()
            .filter(|(label, _)| !matches!(label.as_str(), OWN_DATA | UNRESOLVED))
            .map(|(_, count)| count)
            .sum()
    }
}

/// History file containing all completion reports, oldest first
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportHistory {
    pub entries: Vec<CompletionReport>,
}

impl ReportHistory {
    /// Create a new empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Load history from a file, or create empty if not exists
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save history to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn add_entry(&mut self, report: CompletionReport) {
        self.entries.push(report);
    }

    /// Most recent report for a table kind
    pub fn last(&self, kind: TableKind) -> Option<&CompletionReport> {
        self.entries.iter().rev().find(|r| r.kind == kind)
    }

    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }
}
