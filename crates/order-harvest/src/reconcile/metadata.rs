// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::config::MetadataLabels;
use crate::types::{DocumentGrid, DocumentMetadata};

/// Pull the six metadata fields out of the first `anchor_rows` rows.
///
/// A label cell matches case-insensitively, with or without a trailing
/// colon. Its value is the next non-empty cell to the right unless that cell
/// is itself a label, else the cell directly below. A single cell of the
/// form `Label: value` also matches.
pub fn extract_metadata(
    grid: &DocumentGrid,
    labels: &MetadataLabels,
    anchor_rows: usize,
) -> DocumentMetadata {
    let rows = anchor_rows.min(grid.rows.len());
    let known: Vec<String> = [
        &labels.identifier,
        &labels.category,
        &labels.order_date,
        &labels.expiry,
        &labels.counterparty_name,
        &labels.payment_term,
    ]
    .into_iter()
    .flatten()
    .map(|l| normalize_label(l))
    .collect();
    let find = |candidates: &[String]| {
        find_value(grid, rows, candidates, &known).unwrap_or_default()
    };

    DocumentMetadata {
        identifier: find(&labels.identifier),
        category: find(&labels.category),
        order_date: find(&labels.order_date),
        expiry: find(&labels.expiry),
        counterparty_name: find(&labels.counterparty_name),
        payment_term: find(&labels.payment_term),
    }
}

fn find_value(
    grid: &DocumentGrid,
    rows: usize,
    candidates: &[String],
    known: &[String],
) -> Option<String> {
    let wanted: Vec<String> = candidates.iter().map(|l| normalize_label(l)).collect();
    let matches = |text: &str| wanted.iter().any(|w| *w == normalize_label(text));

    for r in 0..rows {
        for (c, cell) in grid.rows[r].iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            if matches(cell) {
                if let Some(value) = adjacent_value(grid, rows, r, c, known) {
                    return Some(value);
                }
                continue;
            }
            if let Some((label, value)) = cell.split_once(':') {
                let value = value.trim();
                if matches(label) && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn adjacent_value(
    grid: &DocumentGrid,
    rows: usize,
    row: usize,
    col: usize,
    known: &[String],
) -> Option<String> {
    let right = grid.rows[row]
        .iter()
        .skip(col + 1)
        .find(|cell| !cell.is_empty());
    if let Some(value) = right {
        if !known.contains(&normalize_label(value)) {
            return Some(value.clone());
        }
    }
    if row + 1 >= rows {
        return None;
    }
    let below = grid.cell(row + 1, col);
    (!below.is_empty() && !known.contains(&normalize_label(below))).then(|| below.to_string())
}

fn normalize_label(text: &str) -> String {
    text.trim().trim_end_matches(':').trim().to_lowercase()
}
