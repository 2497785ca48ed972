// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Schema Reconciler.
//!
//! Merges documents whose line-item columns differ into one table in two
//! passes. Pass 1 parses every document, locates its line-item header row
//! and grows the canonical schema in first-seen order. Pass 2 projects each
//! document's line-item rows onto the finished schema, prefixed by the
//! document's metadata. Because the schema is complete before any row is
//! projected, a column introduced by a late document never shifts the
//! columns of an earlier one.

pub mod grid;
pub mod metadata;

use crate::config::ReconcileConfig;
use crate::types::{
    CanonicalRow, CanonicalSchema, DocumentGrid, HarvestResult, MergedTable, RawDocument,
    METADATA_WIDTH,
};
use serde::Serialize;
use std::path::PathBuf;

/// Why a document contributed nothing to the merged table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("unreadable: {0}")]
    Unreadable(String),
    #[error("document is empty")]
    Empty,
    #[error("no line-item header row")]
    NoHeaderRow,
}

/// A document left out of the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Output of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub table: MergedTable,
    pub skipped: Vec<SkippedDocument>,
    /// Documents that passed schema discovery.
    pub documents_used: usize,
}

/// Where a document's line items live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemLayout {
    pub header_row: usize,
    /// `(source column, label)` in column order, labels de-duplicated.
    pub headers: Vec<(usize, String)>,
}

/// A document that passed schema discovery.
struct Discovered {
    grid: DocumentGrid,
    layout: LineItemLayout,
}

/// Two-pass merger of heterogeneous order documents.
pub struct SchemaReconciler {
    config: ReconcileConfig,
    sentinels: Vec<String>,
    terminal_markers: Vec<String>,
}

impl SchemaReconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        let sentinels = config
            .header_sentinels
            .iter()
            .map(|s| normalize_sentinel(s))
            .filter(|s| !s.is_empty())
            .collect();
        let terminal_markers = config
            .terminal_markers
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        Self {
            config,
            sentinels,
            terminal_markers,
        }
    }

    /// Parse and merge downloaded documents, in the given order.
    pub fn reconcile(&self, documents: &[RawDocument]) -> Reconciliation {
        let parsed = documents
            .iter()
            .map(|doc| (doc.path.clone(), grid::parse_document(&doc.path)))
            .collect();
        self.reconcile_parsed(parsed)
    }

    /// Merge already-parsed documents. Parse errors become skips.
    pub fn reconcile_parsed(
        &self,
        documents: Vec<(PathBuf, HarvestResult<DocumentGrid>)>,
    ) -> Reconciliation {
        let mut schema = CanonicalSchema::new();
        let mut skipped = Vec::new();
        let mut discovered = Vec::with_capacity(documents.len());

        // Pass 1: schema discovery.
        for (path, parsed) in documents {
            match self.discover(parsed) {
                Ok(doc) => {
                    for (_, label) in &doc.layout.headers {
                        schema.push_unique(label);
                    }
                    discovered.push(doc);
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "document skipped");
                    skipped.push(SkippedDocument { path, reason });
                }
            }
        }
        tracing::info!(
            documents = discovered.len(),
            skipped = skipped.len(),
            columns = schema.width(),
            "canonical schema built"
        );

        // Pass 2: projection.
        let mut rows = Vec::new();
        for doc in &discovered {
            rows.extend(self.project(doc, &schema));
        }

        Reconciliation {
            documents_used: discovered.len(),
            table: MergedTable { schema, rows },
            skipped,
        }
    }

    fn discover(&self, parsed: HarvestResult<DocumentGrid>) -> Result<Discovered, SkipReason> {
        let grid = parsed.map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        if grid.is_blank() {
            return Err(SkipReason::Empty);
        }
        let layout = self.find_layout(&grid).ok_or(SkipReason::NoHeaderRow)?;
        Ok(Discovered { grid, layout })
    }

    /// First row whose first cell is a header sentinel, with its labels.
    pub fn find_layout(&self, grid: &DocumentGrid) -> Option<LineItemLayout> {
        let header_row = grid.rows.iter().position(|row| {
            row.first()
                .is_some_and(|first| self.sentinels.contains(&normalize_sentinel(first)))
        })?;

        let mut headers: Vec<(usize, String)> = Vec::new();
        for (col, cell) in grid.rows[header_row].iter().enumerate() {
            let label = cell.trim();
            if label.is_empty() || headers.iter().any(|(_, seen)| seen == label) {
                continue;
            }
            headers.push((col, label.to_string()));
        }
        Some(LineItemLayout {
            header_row,
            headers,
        })
    }

    fn project(&self, doc: &Discovered, schema: &CanonicalSchema) -> Vec<CanonicalRow> {
        let column_map: Vec<(usize, usize)> = doc
            .layout
            .headers
            .iter()
            .filter_map(|(src, label)| schema.position(label).map(|dst| (*src, dst)))
            .collect();
        debug_assert!(column_map.iter().all(|(_, dst)| *dst >= METADATA_WIDTH));

        let anchor = self.config.anchor_rows.min(doc.layout.header_row);
        let meta = metadata::extract_metadata(&doc.grid, &self.config.metadata_labels, anchor);
        let meta_values = meta.values();

        let mut rows = Vec::new();
        for row in doc.grid.rows.iter().skip(doc.layout.header_row + 1) {
            let first = row.first().map(String::as_str).unwrap_or("");
            if self.is_terminal(first) {
                break;
            }
            if !is_line_item(first) {
                continue;
            }
            let mut projected = vec![String::new(); schema.width()];
            for (slot, value) in projected.iter_mut().zip(meta_values) {
                *slot = value.to_string();
            }
            for &(src, dst) in &column_map {
                if let Some(value) = row.get(src) {
                    projected[dst] = value.clone();
                }
            }
            rows.push(projected);
        }
        tracing::debug!(identifier = %meta.identifier, rows = rows.len(), "document projected");
        rows
    }

    fn is_terminal(&self, first_cell: &str) -> bool {
        let cell = first_cell.to_lowercase();
        self.terminal_markers.iter().any(|m| cell.contains(m.as_str()))
    }
}

/// Lowercase with whitespace and punctuation removed: `"Sr. No"` -> `"srno"`.
pub fn normalize_sentinel(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A line-item row starts with a positive whole number written as digits,
/// optionally followed by a zero fraction (`3`, `3.0`).
pub fn is_line_item(first_cell: &str) -> bool {
    let text = first_cell.trim();
    let (int, frac) = text.split_once('.').unwrap_or((text, ""));
    !int.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b == b'0')
        && !text.ends_with('.')
        && int.bytes().any(|b| b != b'0')
}
