// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Terminal rendering of progress events and run summaries.

use anyhow::Result;
use order_harvest::progress::ProgressReceiver;
use order_harvest::{CleanupOutcome, HarvestSummary};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Print every progress event to stderr until all senders are dropped.
pub fn spawn_progress_printer(mut rx: ProgressReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => eprintln!("  [{:>4}] {}", event.seq, event.event),
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("  ({missed} progress events dropped)");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Write the summary to stdout, as JSON or as a short report.
pub fn print_summary(summary: &HarvestSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!();
    println!("  Harvest complete");
    println!("  ================");
    println!();
    println!("  Pages visited:        {}", summary.pages_visited);
    println!("  Rows attempted:       {}", summary.rows_attempted);
    println!("  Documents downloaded: {}", summary.documents_downloaded);
    println!("  Rows merged:          {}", summary.rows_merged);
    println!("  Columns:              {}", summary.columns);
    println!("  Stopped because:      {}", summary.stop_reason);
    println!("  Output:               {}", summary.output_path.display());

    if !summary.row_failures.is_empty() {
        println!();
        println!("  Failed rows ({}):", summary.row_failures.len());
        for failed in &summary.row_failures {
            println!(
                "    [!!] page {} row #{}: {}",
                failed.page, failed.global_index, failed.failure
            );
        }
    }

    if !summary.documents_skipped.is_empty() {
        println!();
        println!("  Skipped documents ({}):", summary.documents_skipped.len());
        for skipped in &summary.documents_skipped {
            println!("    [!!] {}: {}", skipped.path.display(), skipped.reason);
        }
    }

    match &summary.cleanup {
        Some(CleanupOutcome::Removed) => println!("\n  Download directory removed."),
        Some(CleanupOutcome::Failed { reason }) => {
            println!("\n  [!!] Download directory left behind: {reason}")
        }
        None => {}
    }
    println!();
    Ok(())
}
