// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Paginated document download and schema reconciliation for
//! script-rendered order portals.

pub mod config;
pub mod download;
pub mod harvest;
pub mod locator;
pub mod merge;
pub mod pagination;
pub mod progress;
pub mod reconcile;
pub mod renderer;
pub mod types;

pub use config::{HarvestConfig, OutputFormat};
pub use download::{DownloadReport, RowDownloader, RowFailure, RowOutcome, StopReason};
pub use harvest::{collect_documents, CleanupOutcome, HarvestSummary, Harvester, WorkDir};
pub use locator::{resolve, Resolution};
pub use merge::write_merged;
pub use pagination::{NextPageSignal, PaginationController, TransitionOutcome};
pub use reconcile::{Reconciliation, SchemaReconciler, SkippedDocument};
pub use renderer::{Authenticator, Locator, ProfileSession, RenderContext, Renderer, Scope};
pub use types::*;
