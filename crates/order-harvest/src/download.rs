// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Row Download Coordinator.
//!
//! Discovers the rows of the current list page, downloads one artifact per
//! row into the run's temporary directory, and drives the page loop through
//! the [`PaginationController`] until the limit is reached or no verified
//! next page exists. A failed row is recorded and skipped; it never stops
//! the rest of the page.

use crate::config::DownloadConfig;
use crate::locator;
use crate::pagination::{PaginationController, TransitionOutcome};
use crate::progress::{HarvestEvent, Progress};
use crate::renderer::{ElementHandle, Locator, RenderContext, Scope, TransferError};
use crate::types::RawDocument;
use serde::Serialize;
use std::path::PathBuf;

/// Cells that mark a collected row as a header pseudo-row.
const HEADER_CELLS: &str = "th, [role='columnheader']";

/// Why a single row produced no artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RowFailure {
    #[error("download control not found in row")]
    TriggerNotFound,
    #[error("click failed: {0}")]
    ClickFailed(String),
    #[error("no download completed within {0}ms")]
    TransferTimeout(u64),
    #[error("download failed: {0}")]
    TransferFailed(String),
    #[error("save failed: {0}")]
    SaveFailed(String),
}

impl From<TransferError> for RowFailure {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Click(e) => Self::ClickFailed(format!("{e:#}")),
            TransferError::Timeout(waited) => Self::TransferTimeout(waited.as_millis() as u64),
            TransferError::Failed(e) => Self::TransferFailed(format!("{e:#}")),
        }
    }
}

/// Result of one row's download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Saved(RawDocument),
    Failed {
        global_index: usize,
        failure: RowFailure,
    },
}

/// Everything attempted on one list page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub page: u32,
    /// Data rows found on the page, after header exclusion.
    pub rows_available: usize,
    pub outcomes: Vec<RowOutcome>,
}

impl PageReport {
    pub fn saved(&self) -> impl Iterator<Item = &RawDocument> {
        self.outcomes.iter().filter_map(|o| match o {
            RowOutcome::Saved(doc) => Some(doc),
            RowOutcome::Failed { .. } => None,
        })
    }

    pub fn saved_count(&self) -> usize {
        self.saved().count()
    }
}

/// Why the page loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    LimitReached,
    /// Pagination reported no further page (or could not tell).
    LastPage,
    /// A next page was advertised but the transition was not verified.
    TransitionFailed(TransitionOutcome),
}

/// A row failure with its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRow {
    pub page: u32,
    pub global_index: usize,
    pub failure: RowFailure,
}

/// Outcome of a whole multi-page download run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub pages: Vec<PageReport>,
    pub stop: StopReason,
}

impl DownloadReport {
    /// Saved artifacts in download order.
    pub fn documents(&self) -> Vec<RawDocument> {
        self.pages
            .iter()
            .flat_map(|p| p.saved().cloned())
            .collect()
    }

    pub fn failures(&self) -> Vec<FailedRow> {
        self.pages
            .iter()
            .flat_map(|p| {
                p.outcomes.iter().filter_map(move |o| match o {
                    RowOutcome::Failed {
                        global_index,
                        failure,
                    } => Some(FailedRow {
                        page: p.page,
                        global_index: *global_index,
                        failure: failure.clone(),
                    }),
                    RowOutcome::Saved(_) => None,
                })
            })
            .collect()
    }

    pub fn downloaded(&self) -> usize {
        self.pages.iter().map(PageReport::saved_count).sum()
    }

    /// Total row attempts, successful or not.
    pub fn attempted(&self) -> usize {
        self.pages.iter().map(|p| p.outcomes.len()).sum()
    }
}

/// Downloads one artifact per row, page after page.
pub struct RowDownloader {
    config: DownloadConfig,
    triggers: Vec<Locator>,
    header_cells: Locator,
    download_dir: PathBuf,
    next_index: usize,
    progress: Progress,
}

impl RowDownloader {
    /// Artifacts are saved into `download_dir`, which must exist.
    pub fn new(config: DownloadConfig, download_dir: impl Into<PathBuf>, progress: Progress) -> Self {
        let triggers = config.trigger_chain();
        Self {
            config,
            triggers,
            header_cells: Locator::css(HEADER_CELLS),
            download_dir: download_dir.into(),
            next_index: 0,
            progress,
        }
    }

    /// Download up to `limit` artifacts (0 = unbounded) across pages.
    pub async fn download_all_across_pages(
        &mut self,
        ctx: &mut dyn RenderContext,
        pager: &mut PaginationController,
        limit: usize,
    ) -> DownloadReport {
        let budget = if limit == 0 { usize::MAX } else { limit };
        let total = pager.total_count(ctx).await;
        tracing::info!(limit, advertised_total = total, "starting download loop");

        let mut pages = Vec::new();
        let mut downloaded = 0usize;

        let stop = loop {
            let remaining = budget.saturating_sub(downloaded);
            if remaining == 0 {
                break StopReason::LimitReached;
            }

            let report = self
                .download_from_current_page(ctx, pager.current_page(), remaining)
                .await;
            downloaded += report.saved_count();
            pages.push(report);

            if downloaded >= budget {
                break StopReason::LimitReached;
            }
            if !pager.has_next_page(ctx).await.exists() {
                break StopReason::LastPage;
            }

            let from_page = pager.current_page();
            let outcome = pager.go_to_next_page(ctx).await;
            self.progress.emit(HarvestEvent::PageTransition {
                from_page,
                succeeded: outcome.succeeded(),
            });
            if !outcome.succeeded() {
                self.progress.emit(HarvestEvent::Warning {
                    message: format!("page {from_page}: next page could not be verified ({outcome:?})"),
                });
                break StopReason::TransitionFailed(outcome);
            }
        };

        tracing::info!(
            downloaded,
            pages = pages.len(),
            stop = ?stop,
            "download loop finished"
        );
        DownloadReport { pages, stop }
    }

    /// Download from at most `remaining` rows of the current page, in order.
    pub async fn download_from_current_page(
        &mut self,
        ctx: &mut dyn RenderContext,
        page: u32,
        remaining: usize,
    ) -> PageReport {
        // Handles from earlier pages and pagination checks are superseded.
        ctx.release_handles().await;
        let rows = self.collect_rows(ctx).await;
        let rows_available = rows.len();
        let to_process = rows_available.min(remaining);
        tracing::info!(page, rows_available, to_process, "processing page");
        self.progress.emit(HarvestEvent::PageStarted {
            page,
            rows_available,
            remaining: (remaining != usize::MAX).then_some(remaining),
        });

        let mut outcomes = Vec::with_capacity(to_process);
        for row in rows.into_iter().take(to_process) {
            let global_index = self.next_index;
            self.next_index += 1;

            let outcome = match self.download_row(ctx, row, global_index).await {
                Ok(doc) => {
                    tracing::info!(page, index = global_index, path = %doc.path.display(), "row downloaded");
                    self.progress.emit(HarvestEvent::RowDownloaded {
                        page,
                        global_index,
                        path: doc.path.clone(),
                    });
                    RowOutcome::Saved(doc)
                }
                Err(failure) => {
                    tracing::warn!(page, index = global_index, reason = %failure, "row skipped");
                    self.progress.emit(HarvestEvent::RowFailed {
                        page,
                        global_index,
                        reason: failure.to_string(),
                    });
                    RowOutcome::Failed {
                        global_index,
                        failure,
                    }
                }
            };
            outcomes.push(outcome);

            if self.config.settle_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.settle_ms)).await;
            }
        }

        PageReport {
            page,
            rows_available,
            outcomes,
        }
    }

    async fn download_row(
        &self,
        ctx: &mut dyn RenderContext,
        row: ElementHandle,
        global_index: usize,
    ) -> Result<RawDocument, RowFailure> {
        let trigger = locator::resolve(
            ctx,
            Scope::Element(row),
            &self.triggers,
            self.config.trigger_budget(),
        )
        .await
        .handle()
        .ok_or(RowFailure::TriggerNotFound)?;

        let download = ctx
            .click_for_download(trigger, self.config.transfer_timeout())
            .await?;

        let dest = self
            .download_dir
            .join(artifact_name(global_index, download.suggested_name()));
        download
            .save(&dest)
            .await
            .map_err(|e| RowFailure::SaveFailed(format!("{e:#}")))?;

        Ok(RawDocument {
            path: dest,
            global_index,
        })
    }

    /// Resolve the page's data rows, waiting for a still-rendering table.
    ///
    /// Accepts the first strategy whose row count exceeds the threshold; after
    /// the last attempt, proceeds with the largest collection seen.
    async fn collect_rows(&self, ctx: &mut dyn RenderContext) -> Vec<ElementHandle> {
        let attempts = self.config.row_retry_attempts.max(1);
        let mut best: Vec<ElementHandle> = Vec::new();

        for attempt in 1..=attempts {
            for strategy in &self.config.row_strategies {
                let mut rows = locator::visible_matches(ctx, Scope::Page, &strategy.locator).await;
                if strategy.may_include_header {
                    if let Some(&first) = rows.first() {
                        if self.is_header_row(ctx, first).await {
                            rows.remove(0);
                        }
                    }
                }
                if rows.len() > self.config.min_row_threshold {
                    tracing::debug!(
                        attempt,
                        strategy = %strategy.locator,
                        rows = rows.len(),
                        "rows resolved"
                    );
                    return rows;
                }
                if rows.len() > best.len() {
                    best = rows;
                }
            }
            if attempt < attempts {
                tracing::debug!(attempt, "row collection not ready, retrying");
                tokio::time::sleep(self.config.row_retry_delay()).await;
            }
        }

        tracing::warn!(
            rows = best.len(),
            threshold = self.config.min_row_threshold,
            "row threshold never met, proceeding with best result"
        );
        self.progress.emit(HarvestEvent::Warning {
            message: format!(
                "row count never exceeded {} after {attempts} attempts, proceeding with {} rows",
                self.config.min_row_threshold,
                best.len()
            ),
        });
        best
    }

    async fn is_header_row(&self, ctx: &mut dyn RenderContext, row: ElementHandle) -> bool {
        ctx.find_all(Scope::Element(row), &self.header_cells)
            .await
            .map(|cells| !cells.is_empty())
            .unwrap_or(false)
    }
}

/// File name for a saved artifact: `{index:04}_{suggested}` or a generated
/// `row-{index}-{uuid}.xlsx` when the server suggests nothing usable.
pub fn artifact_name(global_index: usize, suggested: &str) -> String {
    let clean = sanitize_file_name(suggested);
    if clean.is_empty() {
        format!("row-{global_index}-{}.xlsx", uuid::Uuid::new_v4())
    } else {
        format!("{global_index:04}_{clean}")
    }
}

/// Download position encoded in a name produced by [`artifact_name`].
pub fn artifact_index(file_name: &str) -> Option<usize> {
    let digits = match file_name.strip_prefix("row-") {
        Some(rest) => rest.split_once('-')?.0,
        None => file_name.split_once('_')?.0,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.chars().all(|c| c == '_' || c == '.') {
        String::new()
    } else {
        cleaned.to_string()
    }
}
