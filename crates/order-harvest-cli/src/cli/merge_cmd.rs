// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! `order-harvest merge <dir>`: reconcile documents already on disk.

use std::path::Path;

use anyhow::{Context, Result};
use order_harvest::progress::{self, Progress};
use order_harvest::{collect_documents, Harvester};

use super::output;

pub fn run(config: order_harvest::HarvestConfig, dir: &Path, json: bool) -> Result<()> {
    let documents = collect_documents(dir)
        .with_context(|| format!("cannot read documents from {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), documents = documents.len(), "merging");

    let (tx, mut rx) = progress::channel();
    let harvester = Harvester::new(config, Progress::new(Some(tx)))?;
    let merged = harvester.merge_documents(&documents);

    while let Ok(event) = rx.try_recv() {
        eprintln!("  [{:>4}] {}", event.seq, event.event);
    }

    let summary = harvester.summarize_merge(documents.len(), merged?);
    output::print_summary(&summary, json)
}
