//! Error types for fu-core

use std::path::PathBuf;
use thiserror::Error;

use crate::schema::{Quantity, TableKind};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fu-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Requested quantity is not completable for this table kind
    #[error("quantity '{quantity}' is not supported for {kind} tables")]
    UnsupportedQuantity { kind: TableKind, quantity: String },

    /// Unknown table kind name
    #[error("unknown table kind '{0}' (expected 'allocation' or 'efficiency')")]
    UnknownTableKind(String),

    /// Unknown source label in a completed table
    #[error("invalid source label '{0}'")]
    InvalidSource(String),

    /// A completable row is missing one of its key fields
    #[error("malformed key for {country}/{year}: {detail}")]
    MalformedKey {
        country: String,
        year: i32,
        detail: String,
    },

    /// A value is outside its admissible range
    #[error("invalid {quantity} value {value} for {country}/{year} ({key})")]
    InvalidValue {
        country: String,
        year: i32,
        key: String,
        quantity: String,
        value: f64,
    },

    /// Context data for one country/year mixes units
    #[error("inconsistent units for {country}/{year}: '{expected}' and '{found}'")]
    InconsistentUnits {
        country: String,
        year: i32,
        expected: String,
        found: String,
    },

    /// The completed allocation table cannot feed efficiency completion
    #[error("completed allocation has no '{quantity}' rows, needed for {needed_for}")]
    MissingAllocationQuantity {
        quantity: Quantity,
        needed_for: String,
    },

    /// A work unit failed; wraps the underlying error with its country/year
    #[error("completing {country}/{year} failed: {source}")]
    Unit {
        country: String,
        year: i32,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attach the country/year of the work unit that produced this error
    pub fn in_unit(self, country: &str, year: i32) -> Self {
        Error::Unit {
            country: country.to_string(),
            year,
            source: Box::new(self),
        }
    }
}
