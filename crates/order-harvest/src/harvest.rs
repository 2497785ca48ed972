// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run orchestration: authenticate, download across pages, reconcile,
//! write, then clean up the run's download directory.
//!
//! The caller owns the browser context and passes it in; nothing here opens
//! or closes a session.

use crate::config::HarvestConfig;
use crate::download::{artifact_index, DownloadReport, FailedRow, RowDownloader, StopReason};
use crate::merge;
use crate::pagination::{PaginationController, TransitionOutcome};
use crate::progress::{HarvestEvent, Progress};
use crate::reconcile::{Reconciliation, SchemaReconciler, SkippedDocument};
use crate::renderer::{Authenticator, RenderContext};
use crate::types::{HarvestError, HarvestResult, RawDocument};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Partial downloads written by the browser; never reconciled.
const PARTIAL_SUFFIXES: [&str; 3] = [".crdownload", ".part", ".tmp"];

/// Result of removing the run's download directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    Failed { reason: String },
}

/// Per-run directory that receives downloaded artifacts.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Create a fresh, uniquely named directory under `base`.
    pub fn create(base: &Path) -> HarvestResult<Self> {
        let path = base.join(format!(".downloads-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort removal. Failure is logged and reported, never raised.
    pub fn remove(self) -> CleanupOutcome {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "download directory removed");
                CleanupOutcome::Removed
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "could not remove download directory: {e}");
                CleanupOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Reconciled table written to disk.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub path: PathBuf,
    pub reconciliation: Reconciliation,
}

/// Machine-readable account of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub pages_visited: usize,
    pub rows_attempted: usize,
    pub documents_downloaded: usize,
    pub row_failures: Vec<FailedRow>,
    pub documents_skipped: Vec<SkippedDocument>,
    pub rows_merged: usize,
    pub columns: usize,
    pub output_path: PathBuf,
    pub stop_reason: String,
    pub cleanup: Option<CleanupOutcome>,
}

/// Drives one end-to-end run against a caller-owned browser context.
pub struct Harvester {
    config: HarvestConfig,
    progress: Progress,
}

impl Harvester {
    pub fn new(config: HarvestConfig, progress: Progress) -> HarvestResult<Self> {
        config.validate()?;
        Ok(Self { config, progress })
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Full pipeline. `work` must be the directory the context downloads into.
    ///
    /// On a fatal error the downloaded artifacts stay in `work` so they can
    /// be merged offline.
    pub async fn run(
        &self,
        ctx: &mut dyn RenderContext,
        auth: &dyn Authenticator,
        work: WorkDir,
    ) -> HarvestResult<HarvestSummary> {
        auth.prepare(ctx).await?;

        let mut pager = PaginationController::new(self.config.pagination.clone())?;
        let mut downloader =
            RowDownloader::new(self.config.download.clone(), work.path(), self.progress.clone());
        let report = downloader
            .download_all_across_pages(ctx, &mut pager, self.config.limit)
            .await;

        let documents = report.documents();
        if documents.is_empty() {
            return Err(HarvestError::NoDocumentsDownloaded);
        }

        let merged = self.merge_documents(&documents)?;
        let cleanup = work.remove();
        Ok(self.summarize(&report, merged, Some(cleanup)))
    }

    /// Reconcile `documents` in order and write the merged table.
    pub fn merge_documents(&self, documents: &[RawDocument]) -> HarvestResult<MergeOutcome> {
        if documents.is_empty() {
            return Err(HarvestError::NoDocumentsDownloaded);
        }
        let reconciler = SchemaReconciler::new(self.config.reconcile.clone());
        let reconciliation = reconciler.reconcile(documents);
        for skipped in &reconciliation.skipped {
            self.progress.emit(HarvestEvent::DocumentSkipped {
                path: skipped.path.clone(),
                reason: skipped.reason.to_string(),
            });
        }

        let path = merge::write_merged(
            &reconciliation.table,
            &self.config.output_dir,
            &self.config.output_prefix,
            self.config.output_format,
        )?;
        self.progress.emit(HarvestEvent::MergeWritten {
            path: path.clone(),
            rows: reconciliation.table.data_row_count(),
        });
        Ok(MergeOutcome {
            path,
            reconciliation,
        })
    }

    /// Summary of an offline merge, with no download report.
    pub fn summarize_merge(&self, documents: usize, merged: MergeOutcome) -> HarvestSummary {
        let mut summary = self.summarize(
            &DownloadReport {
                pages: Vec::new(),
                stop: StopReason::LastPage,
            },
            merged,
            None,
        );
        summary.documents_downloaded = documents;
        summary.stop_reason = "offline merge".to_string();
        summary
    }

    fn summarize(
        &self,
        report: &DownloadReport,
        merged: MergeOutcome,
        cleanup: Option<CleanupOutcome>,
    ) -> HarvestSummary {
        let table = &merged.reconciliation.table;
        HarvestSummary {
            pages_visited: report.pages.len(),
            rows_attempted: report.attempted(),
            documents_downloaded: report.downloaded(),
            row_failures: report.failures(),
            rows_merged: table.data_row_count(),
            columns: table.schema.width(),
            output_path: merged.path,
            stop_reason: describe_stop(&report.stop),
            documents_skipped: merged.reconciliation.skipped,
            cleanup,
        }
    }
}

fn describe_stop(stop: &StopReason) -> String {
    match stop {
        StopReason::LimitReached => "limit reached".to_string(),
        StopReason::LastPage => "no further page".to_string(),
        StopReason::TransitionFailed(TransitionOutcome::NoTrigger) => {
            "next page advertised but no clickable control".to_string()
        }
        StopReason::TransitionFailed(TransitionOutcome::Unverifiable) => {
            "next page advertised but rows carry no fingerprint".to_string()
        }
        StopReason::TransitionFailed(TransitionOutcome::Unchanged { fingerprint }) => {
            format!("list did not change after next-page click (still at {fingerprint})")
        }
        StopReason::TransitionFailed(TransitionOutcome::Changed { .. }) => {
            "transition succeeded".to_string()
        }
    }
}

/// Downloaded artifacts in `dir`, in download order: names carrying a
/// download index sort by that index, the rest follow by name.
pub fn collect_documents(dir: &Path) -> HarvestResult<Vec<RawDocument>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let index = artifact_index(&name);
        (index.is_none(), index, name)
    });
    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(global_index, path)| RawDocument { path, global_index })
        .collect())
}

/// Best-effort full-page screenshot into `dir`, for post-mortem of a failed run.
pub async fn capture_diagnostics(ctx: &mut dyn RenderContext, dir: &Path) -> Option<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("failure_{stamp}.png"));
    match ctx.screenshot(&path).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), "diagnostic screenshot saved");
            Some(path)
        }
        Err(e) => {
            tracing::warn!("diagnostic screenshot failed: {e:#}");
            None
        }
    }
}
