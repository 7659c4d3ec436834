use std::fmt::Display;

use serde::Serialize;

/// Error type that can be returned by fallible operations in this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested filename was empty, escaped the ledger root, or was not a `.csv` file.
    /// Raised before the file is ever opened.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    /// The filename was valid but no such ledger file exists under the root
    #[error("CSV file not found: {0}")]
    NotFound(String),
    /// The file content could not be decoded with any candidate encoding
    #[error("Could not decode {0} as UTF-8 or Shift_JIS")]
    Decode(String),
    /// The header row is missing one of the expected ledger columns
    #[error("Missing column {0} in ledger header")]
    Schema(String),
    /// Every data row of a ledger failed to parse
    #[error("No usable rows in {0}")]
    NoUsableRows(String),
    /// A single row failed to parse while running under [`RowPolicy::Strict`](crate::types::RowPolicy::Strict)
    #[error(transparent)]
    RowParse(#[from] RowParseError),
    /// Free text that none of the month patterns recognised
    #[error("Could not resolve a month from {0:?}")]
    UnresolvedMonth(String),
    /// The webhook destination does not start with the allow-listed prefix
    #[error("Destination is not allowed: {0}")]
    DestinationNotAllowed(String),
    /// The webhook call timed out, failed, or answered with a non-success status
    #[error("Delivery failed: {0}")]
    Delivery(String),
    /// A required piece of configuration is missing or invalid
    #[error("{0}")]
    NotConfigured(String),
    /// An inbound slash command failed signature or token verification
    #[error("{0}")]
    Unauthorized(String),
    /// The request itself was malformed
    #[error("{0}")]
    BadRequest(String),
    /// Error reading the ledger directory or a ledger file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Error splitting decoded text into CSV rows
    #[error("Error processing CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Stable machine-readable code reported alongside the message
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidPath(_) => "invalid_path",
            Error::NotFound(_) => "not_found",
            Error::Decode(_) => "decode_error",
            Error::Schema(_) | Error::NoUsableRows(_) => "schema_error",
            Error::RowParse(_) => "row_parse_error",
            Error::UnresolvedMonth(_) => "unresolved_month",
            Error::DestinationNotAllowed(_) => "destination_not_allowed",
            Error::Delivery(_) => "delivery_error",
            Error::NotConfigured(_) => "not_configured",
            Error::Unauthorized(_) => "unauthorized",
            Error::BadRequest(_) => "bad_request",
            Error::Io(_) => "io_error",
            Error::Csv(_) => "csv_error",
        }
    }
}

/// A single malformed ledger row.
///
/// Under skip-and-continue these are collected as warnings next to the parsed records
/// instead of failing the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("row {row}: {column}: {reason}")]
pub struct RowParseError {
    /// 1-based data row number (the header is not counted)
    pub row: usize,
    /// Column whose value could not be parsed
    pub column: String,
    /// What was wrong with it
    pub reason: String,
}

impl RowParseError {
    pub(crate) fn new(row: usize, column: &str, reason: impl Display) -> Self {
        Self {
            row,
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }
}
