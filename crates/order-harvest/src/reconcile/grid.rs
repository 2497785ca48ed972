// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Parse a downloaded document into a [`DocumentGrid`].
//!
//! Spreadsheets (first worksheet) go through calamine; `.csv` files through
//! the csv crate. Files with an unrecognized extension are sniffed.

use crate::types::{DocumentGrid, HarvestError, HarvestResult};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;
use std::path::Path;

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Read the first worksheet (or the CSV body) of `path` as trimmed strings.
pub fn parse_document(path: &Path) -> HarvestResult<DocumentGrid> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ext == "csv" {
        return parse_csv(path);
    }

    let range = if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        let mut workbook = open_workbook_auto(path).map_err(spreadsheet_err)?;
        first_sheet(&mut workbook)?
    } else {
        let bytes = std::fs::read(path)?;
        let mut workbook =
            open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(spreadsheet_err)?;
        first_sheet(&mut workbook)?
    };

    Ok(DocumentGrid::new(
        range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect(),
    ))
}

fn first_sheet<R: Reader<RS>, RS>(workbook: &mut R) -> HarvestResult<Range<Data>>
where
    R::Error: std::fmt::Display,
    RS: std::io::Read + std::io::Seek,
{
    match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(spreadsheet_err),
        None => Err(HarvestError::Spreadsheet("workbook has no worksheets".into())),
    }
}

fn spreadsheet_err(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::Spreadsheet(e.to_string())
}

fn parse_csv(path: &Path) -> HarvestResult<DocumentGrid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }
    Ok(DocumentGrid::new(rows))
}

/// Render one cell as text. Whole floats lose their `.0`, so a serial
/// number stored as `3.0` reads `3`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            (*f as i64).to_string()
        }
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.time() == chrono::NaiveTime::MIN => ts.format("%Y-%m-%d").to_string(),
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{e:?}"),
    }
}
