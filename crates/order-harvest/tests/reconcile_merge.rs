// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reconcile-and-write tests over real spreadsheet files.

use order_harvest::config::{HarvestConfig, OutputFormat, ReconcileConfig};
use order_harvest::harvest::{collect_documents, Harvester};
use order_harvest::progress::{self, HarvestEvent, Progress};
use order_harvest::reconcile::grid::parse_document;
use order_harvest::reconcile::{SchemaReconciler, SkipReason};
use order_harvest::{write_merged, HarvestError, RawDocument};
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ── Fixture builders ──

/// Write an order workbook: metadata label/value rows, a blank row, then
/// the line-item table given as rows of strings (numeric strings become
/// number cells, as the portal exports them).
fn write_order(path: &Path, meta: &[(&str, &str)], table: &[&[&str]]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, (label, value)) in meta.iter().enumerate() {
        sheet.write_string(r as u32, 0, *label).unwrap();
        sheet.write_string(r as u32, 1, *value).unwrap();
    }
    let offset = meta.len() as u32 + 1;
    for (r, row) in table.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let (r, c) = (offset + r as u32, c as u16);
            match cell.parse::<f64>() {
                Ok(n) => sheet.write_number(r, c, n).unwrap(),
                Err(_) => sheet.write_string(r, c, *cell).unwrap(),
            };
        }
    }
    workbook.save(path).unwrap();
}

fn raw(dir: &Path, index: usize, name: &str) -> RawDocument {
    RawDocument {
        path: dir.join(name),
        global_index: index,
    }
}

fn csv_lines(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn three_orders(dir: &Path) -> Vec<RawDocument> {
    let mut docs = Vec::new();
    for (i, id) in ["PO1", "PO2", "PO3"].iter().enumerate() {
        let name = format!("{i:04}_{id}.xlsx");
        let date = format!("2026-01-0{}", i + 1);
        let vendor = format!("Vendor {id}");
        write_order(
            &dir.join(&name),
            &[
                ("identifier", id),
                ("category", "Goods"),
                ("orderDate", &date),
                ("expiry", "2026-12-31"),
                ("counterpartyName", &vendor),
                ("paymentTerm", "Net 30"),
            ],
            &[&["Sno", "Qty"], &["1", "10"], &["2", "20"]],
        );
        docs.push(raw(dir, i, &name));
    }
    docs
}

// ── Merge output ──

#[test]
fn test_three_documents_merge_into_six_rows() {
    let dir = TempDir::new().unwrap();
    let docs = three_orders(dir.path());

    let result = SchemaReconciler::new(ReconcileConfig::default()).reconcile(&docs);
    let out = dir.path().join("out");
    let path = write_merged(&result.table, &out, "merged_orders", OutputFormat::Csv).unwrap();

    let lines = csv_lines(&path);
    assert_eq!(lines.len(), 7);
    assert_eq!(
        lines[0],
        vec![
            "identifier",
            "category",
            "orderDate",
            "expiry",
            "counterpartyName",
            "paymentTerm",
            "Sno",
            "Qty"
        ]
    );
    for (i, id) in ["PO1", "PO2", "PO3"].iter().enumerate() {
        for (j, qty) in ["10", "20"].iter().enumerate() {
            let row = &lines[1 + i * 2 + j];
            assert_eq!(
                row[..6],
                [
                    id.to_string(),
                    "Goods".to_string(),
                    format!("2026-01-0{}", i + 1),
                    "2026-12-31".to_string(),
                    format!("Vendor {id}"),
                    "Net 30".to_string(),
                ]
            );
            assert_eq!(row[6], (j + 1).to_string());
            assert_eq!(row[7], *qty);
        }
    }
}

#[test]
fn test_xlsx_output_reads_back() {
    let dir = TempDir::new().unwrap();
    let docs = three_orders(dir.path());
    let result = SchemaReconciler::new(ReconcileConfig::default()).reconcile(&docs);

    let path = write_merged(&result.table, dir.path(), "merged", OutputFormat::Xlsx).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("merged_") && name.ends_with(".xlsx"));
    // merged_YYYYMMDD_HHMMSS.xlsx
    assert_eq!(name.len(), "merged_".len() + 15 + ".xlsx".len());

    let grid = parse_document(&path).unwrap();
    assert_eq!(grid.rows.len(), 7);
    assert_eq!(grid.cell(0, 7), "Qty");
    assert_eq!(grid.cell(6, 0), "PO3");
    assert_eq!(grid.cell(6, 7), "20");
}

#[test]
fn test_differing_columns_align_by_header() {
    let dir = TempDir::new().unwrap();
    write_order(
        &dir.path().join("a.xlsx"),
        &[("PO No", "PO-A")],
        &[&["S.No", "Item", "Rate"], &["1", "Bolt", "2.5"]],
    );
    write_order(
        &dir.path().join("b.xlsx"),
        &[("PO No", "PO-B")],
        &[&["Sr. No", "Rate", "Tax"], &["1", "4", "18%"]],
    );
    let docs = vec![raw(dir.path(), 0, "a.xlsx"), raw(dir.path(), 1, "b.xlsx")];

    let result = SchemaReconciler::new(ReconcileConfig::default()).reconcile(&docs);
    let schema = &result.table.schema;
    assert_eq!(
        schema.line_item_headers(),
        &["S.No", "Item", "Rate", "Sr. No", "Tax"]
    );
    let rows = &result.table.rows;
    let rate = schema.position("Rate").unwrap();
    let tax = schema.position("Tax").unwrap();
    let item = schema.position("Item").unwrap();
    assert_eq!(rows[0][rate], "2.5");
    assert_eq!(rows[0][tax], "");
    assert_eq!(rows[1][rate], "4");
    assert_eq!(rows[1][tax], "18%");
    assert_eq!(rows[1][item], "");
    assert!(rows.iter().all(|r| r.len() == schema.width()));
}

#[test]
fn test_rows_after_total_are_excluded() {
    let dir = TempDir::new().unwrap();
    write_order(
        &dir.path().join("po.xlsx"),
        &[("PO No", "PO-9")],
        &[
            &["Sno", "Item"],
            &["1", "Bolt"],
            &["2", "Nut"],
            &["TOTAL", ""],
            &["3", "Washer"],
        ],
    );
    let result = SchemaReconciler::new(ReconcileConfig::default())
        .reconcile(&[raw(dir.path(), 0, "po.xlsx")]);
    let items: Vec<&str> = result.table.rows.iter().map(|r| r[7].as_str()).collect();
    assert_eq!(items, vec!["Bolt", "Nut"]);
}

// ── Failures ──

#[test]
fn test_unreadable_documents_are_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let mut docs = three_orders(dir.path());
    std::fs::write(dir.path().join("9999_bad.xlsx"), b"<html>session expired</html>").unwrap();
    docs.insert(1, raw(dir.path(), 9, "9999_bad.xlsx"));
    docs.push(raw(dir.path(), 10, "missing.xlsx"));

    let result = SchemaReconciler::new(ReconcileConfig::default()).reconcile(&docs);
    assert_eq!(result.documents_used, 3);
    assert_eq!(result.table.rows.len(), 6);
    assert_eq!(result.skipped.len(), 2);
    assert!(result
        .skipped
        .iter()
        .all(|s| matches!(s.reason, SkipReason::Unreadable(_))));
    assert_eq!(result.skipped[0].path, dir.path().join("9999_bad.xlsx"));
}

#[test]
fn test_no_surviving_rows_writes_nothing() {
    let dir = TempDir::new().unwrap();
    write_order(
        &dir.path().join("po.xlsx"),
        &[("PO No", "PO-1")],
        &[&["Sno", "Item"], &["Total", ""]],
    );
    let out = dir.path().join("out");
    let config = HarvestConfig {
        output_dir: out.clone(),
        ..Default::default()
    };
    let harvester = Harvester::new(config, Progress::silent()).unwrap();

    let err = harvester
        .merge_documents(&[raw(dir.path(), 0, "po.xlsx")])
        .unwrap_err();
    assert!(matches!(err, HarvestError::NoDataRows));
    assert!(!out.exists());
}

// ── Offline merge ──

#[test]
fn test_offline_merge_of_download_directory() {
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    std::fs::create_dir(&downloads).unwrap();
    three_orders(&downloads);
    std::fs::write(downloads.join("0003_x.xlsx.crdownload"), b"partial").unwrap();
    std::fs::write(downloads.join("0004_notes.csv"), "just,notes\n").unwrap();

    let (tx, mut rx) = progress::channel();
    let config = HarvestConfig {
        output_dir: dir.path().join("out"),
        output_prefix: "offline".to_string(),
        output_format: OutputFormat::Csv,
        ..Default::default()
    };
    let harvester = Harvester::new(config, Progress::new(Some(tx))).unwrap();

    let documents = collect_documents(&downloads).unwrap();
    assert_eq!(documents.len(), 4);
    let merged = harvester.merge_documents(&documents).unwrap();
    let summary = harvester.summarize_merge(documents.len(), merged);

    assert_eq!(summary.rows_merged, 6);
    assert_eq!(summary.documents_skipped.len(), 1);
    assert_eq!(
        summary.documents_skipped[0].reason,
        SkipReason::NoHeaderRow
    );
    assert!(summary.output_path.starts_with(dir.path().join("out")));

    let mut skipped: Option<PathBuf> = None;
    let mut written = None;
    while let Ok(event) = rx.try_recv() {
        match event.event {
            HarvestEvent::DocumentSkipped { path, .. } => skipped = Some(path),
            HarvestEvent::MergeWritten { rows, .. } => written = Some(rows),
            _ => {}
        }
    }
    assert_eq!(skipped, Some(downloads.join("0004_notes.csv")));
    assert_eq!(written, Some(6));
}
