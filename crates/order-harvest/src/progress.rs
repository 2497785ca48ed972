// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for run telemetry.
//!
//! The harvest stages emit `HarvestEvent`s through a `tokio::sync::broadcast`
//! channel to any subscriber (the CLI's line renderer, tests). When no
//! subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: HarvestEvent,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    /// Row discovery started on a list page.
    PageStarted {
        page: u32,
        rows_available: usize,
        remaining: Option<usize>,
    },
    /// One artifact was saved.
    RowDownloaded {
        page: u32,
        global_index: usize,
        path: PathBuf,
    },
    /// One row was skipped after a download failure.
    RowFailed {
        page: u32,
        global_index: usize,
        reason: String,
    },
    /// A next-page transition was attempted.
    PageTransition { from_page: u32, succeeded: bool },
    /// A downloaded document could not be reconciled.
    DocumentSkipped { path: PathBuf, reason: String },
    /// The merged table was written.
    MergeWritten { path: PathBuf, rows: usize },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Optional sender plus a sequence counter shared by all clones.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<ProgressSender>,
    seq: Arc<AtomicU64>,
}

impl Progress {
    pub fn new(tx: Option<ProgressSender>) -> Self {
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A sink that discards every event.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Emit an event, silently ignoring send errors (no receivers listening).
    pub fn emit(&self, event: HarvestEvent) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(ProgressEvent { seq, event });
        }
    }
}

impl std::fmt::Display for HarvestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageStarted {
                page,
                rows_available,
                remaining,
            } => match remaining {
                Some(r) => write!(f, "page {page}: {rows_available} rows, {r} still wanted"),
                None => write!(f, "page {page}: {rows_available} rows"),
            },
            Self::RowDownloaded {
                global_index, path, ..
            } => write!(f, "#{global_index} saved {}", path.display()),
            Self::RowFailed {
                global_index,
                reason,
                ..
            } => write!(f, "#{global_index} failed: {reason}"),
            Self::PageTransition {
                from_page,
                succeeded: true,
            } => write!(f, "moved past page {from_page}"),
            Self::PageTransition {
                from_page,
                succeeded: false,
            } => write!(f, "could not move past page {from_page}"),
            Self::DocumentSkipped { path, reason } => {
                write!(f, "skipped {}: {reason}", path.display())
            }
            Self::MergeWritten { path, rows } => {
                write!(f, "wrote {rows} rows to {}", path.display())
            }
            Self::Warning { message } => write!(f, "warning: {message}"),
        }
    }
}
