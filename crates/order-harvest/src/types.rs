// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data types shared by the harvesting and reconciliation stages.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Header labels of the six metadata columns, in canonical order.
pub const METADATA_HEADERS: [&str; 6] = [
    "identifier",
    "category",
    "orderDate",
    "expiry",
    "counterpartyName",
    "paymentTerm",
];

/// Number of fixed metadata columns at the front of every canonical row.
pub const METADATA_WIDTH: usize = METADATA_HEADERS.len();

/// One downloaded per-row artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub path: PathBuf,
    pub global_index: usize,
}

/// Parsed cell grid of one document. Cells are trimmed strings; empty cells are `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentGrid {
    pub rows: Vec<Vec<String>>,
}

impl DocumentGrid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// True when the grid holds no non-empty cell at all.
    pub fn is_blank(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.iter().all(|cell| cell.trim().is_empty()))
    }

    /// Cell at `(row, col)`, or `""` when out of range.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// The fixed metadata block of one order document. Missing fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub identifier: String,
    pub category: String,
    pub order_date: String,
    pub expiry: String,
    pub counterparty_name: String,
    pub payment_term: String,
}

impl DocumentMetadata {
    /// Values in the order of [`METADATA_HEADERS`].
    pub fn values(&self) -> [&str; METADATA_WIDTH] {
        [
            &self.identifier,
            &self.category,
            &self.order_date,
            &self.expiry,
            &self.counterparty_name,
            &self.payment_term,
        ]
    }
}

/// Unified, de-duplicated column list across all documents of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    headers: Vec<String>,
}

impl CanonicalSchema {
    /// A schema holding only the metadata headers.
    pub fn new() -> Self {
        Self {
            headers: METADATA_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Append `header` unless it is already present. Returns true if it was added.
    pub fn push_unique(&mut self, header: &str) -> bool {
        if self.position(header).is_some() {
            return false;
        }
        self.headers.push(header.to_string());
        true
    }

    /// Canonical index of `header`, if known.
    pub fn position(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Line-item headers only (everything after the metadata block).
    pub fn line_item_headers(&self) -> &[String] {
        &self.headers[METADATA_WIDTH..]
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// One projected row: exactly `schema.width()` cells.
pub type CanonicalRow = Vec<String>;

/// Header row plus all projected rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTable {
    pub schema: CanonicalSchema,
    pub rows: Vec<CanonicalRow>,
}

impl MergedTable {
    /// All rows including the header row, as written to disk.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(self.schema.headers().to_vec());
        out.extend(self.rows.iter().cloned());
        out
    }

    pub fn data_row_count(&self) -> usize {
        self.rows.len()
    }
}

/// All errors surfaced by the harvesting library.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Browser(#[from] anyhow::Error),

    #[error("No documents were downloaded")]
    NoDocumentsDownloaded,

    #[error("No data rows survived reconciliation")]
    NoDataRows,
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;
