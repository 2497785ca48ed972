// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Merge Writer: serializes a [`MergedTable`] to one xlsx or csv file named
//! `{prefix}_{YYYYMMDD_HHMMSS}.{ext}`.

use crate::config::OutputFormat;
use crate::types::{HarvestError, HarvestResult, MergedTable};
use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};

const SHEET_NAME: &str = "Orders";

/// Write `table` into `output_dir`, creating the directory if needed.
///
/// Fails with [`HarvestError::NoDataRows`] when the table holds only a
/// header, in which case nothing is written.
pub fn write_merged(
    table: &MergedTable,
    output_dir: &Path,
    prefix: &str,
    format: OutputFormat,
) -> HarvestResult<PathBuf> {
    if table.data_row_count() == 0 {
        return Err(HarvestError::NoDataRows);
    }
    std::fs::create_dir_all(output_dir)?;

    let path = output_path(output_dir, prefix, format, Local::now());
    match format {
        OutputFormat::Xlsx => write_xlsx(table, &path)?,
        OutputFormat::Csv => write_csv(table, &path)?,
    }

    tracing::info!(
        path = %path.display(),
        rows = table.data_row_count(),
        columns = table.schema.width(),
        "merged table written"
    );
    Ok(path)
}

/// Timestamped output path. A `_1`, `_2`, ... suffix is added while the
/// name is already taken, so two writes within one second never collide.
pub fn output_path(
    output_dir: &Path,
    prefix: &str,
    format: OutputFormat,
    at: DateTime<Local>,
) -> PathBuf {
    let stem = format!("{prefix}_{}", at.format("%Y%m%d_%H%M%S"));
    let ext = format.extension();
    let mut candidate = output_dir.join(format!("{stem}.{ext}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = output_dir.join(format!("{stem}_{n}.{ext}"));
        n += 1;
    }
    candidate
}

fn write_xlsx(table: &MergedTable, path: &Path) -> HarvestResult<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in table.schema.headers().iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let excel_row = u32::try_from(r + 1)
            .map_err(|_| HarvestError::Spreadsheet("too many rows for a worksheet".into()))?;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match numeric_value(value) {
                Some(n) => sheet.write_number(excel_row, col as u16, n)?,
                None => sheet.write_string(excel_row, col as u16, value)?,
            };
        }
    }
    sheet.set_freeze_panes(1, 0)?;

    workbook.save(path)?;
    Ok(())
}

/// Plain decimal text written as a number cell. Codes with leading zeros,
/// exponents, signs other than `-` and integers past 15 digits stay text.
fn numeric_value(text: &str) -> Option<f64> {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let plain = !int.is_empty()
        && int.len() <= 15
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
        && !unsigned.ends_with('.')
        && !(int.len() > 1 && int.starts_with('0'));
    if !plain {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn write_csv(table: &MergedTable, path: &Path) -> HarvestResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.schema.headers())?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanonicalSchema;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn table(rows: usize) -> MergedTable {
        let mut schema = CanonicalSchema::new();
        schema.push_unique("Sno");
        MergedTable {
            rows: (1..=rows)
                .map(|i| {
                    let mut row = vec![String::new(); schema.width()];
                    row[0] = format!("PO{i}");
                    row[6] = i.to_string();
                    row
                })
                .collect(),
            schema,
        }
    }

    #[test]
    fn test_output_name_format() {
        let dir = TempDir::new().unwrap();
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        let path = output_path(dir.path(), "merged_orders", OutputFormat::Xlsx, at);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "merged_orders_20260309_140507.xlsx"
        );
    }

    #[test]
    fn test_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        let first = output_path(dir.path(), "po", OutputFormat::Csv, at);
        std::fs::write(&first, "x").unwrap();
        let second = output_path(dir.path(), "po", OutputFormat::Csv, at);
        assert_eq!(second.file_name().unwrap(), "po_20260309_140507_1.csv");
        std::fs::write(&second, "x").unwrap();
        let third = output_path(dir.path(), "po", OutputFormat::Csv, at);
        assert_eq!(third.file_name().unwrap(), "po_20260309_140507_2.csv");
    }

    #[test]
    fn test_header_only_table_is_fatal() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let err = write_merged(&table(0), &out, "po", OutputFormat::Csv).unwrap_err();
        assert!(matches!(err, HarvestError::NoDataRows));
        assert!(!out.exists());
    }

    #[test]
    fn test_csv_written_with_header() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");
        let path = write_merged(&table(2), &out, "po", OutputFormat::Csv).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "identifier,category,orderDate,expiry,counterpartyName,paymentTerm,Sno"
        );
        assert_eq!(lines[1], "PO1,,,,,,1");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(numeric_value("20"), Some(20.0));
        assert_eq!(numeric_value("7.5"), Some(7.5));
        assert_eq!(numeric_value("-3"), Some(-3.0));
        assert_eq!(numeric_value("0.25"), Some(0.25));
        for text in ["007", "1e3", "+4", "inf", "NaN", "3.", ".5", "2026-01-01", "PO1", "12345678901234567"] {
            assert_eq!(numeric_value(text), None, "{text}");
        }
    }

    #[test]
    fn test_xlsx_numbers_are_number_cells() {
        use calamine::{open_workbook_auto, Data, Reader};

        let dir = TempDir::new().unwrap();
        let mut merged = table(1);
        merged.rows[0][1] = "007".to_string();
        merged.rows[0][6] = "12.5".to_string();
        let path = write_merged(&merged, dir.path(), "po", OutputFormat::Xlsx).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        assert_eq!(range.get_value((1, 6)), Some(&Data::Float(12.5)));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("007".into())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::String("PO1".into())));
    }

    #[test]
    fn test_xlsx_written() {
        let dir = TempDir::new().unwrap();
        let path = write_merged(&table(3), dir.path(), "po", OutputFormat::Xlsx).unwrap();
        assert_eq!(path.extension().unwrap(), "xlsx");
        let grid = crate::reconcile::grid::parse_document(&path).unwrap();
        assert_eq!(grid.rows.len(), 4);
        assert_eq!(grid.cell(0, 6), "Sno");
        assert_eq!(grid.cell(3, 0), "PO3");
    }
}
