// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading and resolution.
//!
//! Precedence, highest first: explicit overrides from the caller (CLI flags),
//! `HARVEST_*` environment variables, a JSON config file, built-in defaults.

use crate::renderer::Locator;
use crate::types::{HarvestError, HarvestResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "order-harvest.json";

/// Output table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Xlsx,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(HarvestError::Config(format!("unknown output format `{other}`"))),
        }
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Page listing the documents. Required for a browser run.
    pub list_url: Option<String>,
    /// Maximum number of artifacts to download; 0 means unbounded.
    pub limit: usize,
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    /// Persistent browser profile holding an authenticated session.
    pub profile_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub output_format: OutputFormat,
    /// Where failure screenshots go.
    pub diagnostics_dir: PathBuf,
    pub navigation_timeout_ms: u64,
    pub pagination: PaginationConfig,
    pub download: DownloadConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            list_url: None,
            limit: 0,
            headless: true,
            chromium_path: None,
            profile_dir: None,
            output_dir: PathBuf::from("output"),
            output_prefix: "merged_orders".to_string(),
            output_format: OutputFormat::Xlsx,
            diagnostics_dir: PathBuf::from("logs"),
            navigation_timeout_ms: 60_000,
            pagination: PaginationConfig::default(),
            download: DownloadConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

/// Pagination detection and page-transition policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Candidates for the next-page control, used when no text pattern decides.
    pub next_control: Vec<Locator>,
    /// Interaction strategies for triggering the next page, in order.
    pub next_triggers: Vec<Locator>,
    /// Row locators scanned for the fingerprint token.
    pub fingerprint_rows: Vec<Locator>,
    /// Regex whose first match in the first data row is the fingerprint.
    pub fingerprint_pattern: String,
    /// Total budget for resolving one control across all strategies.
    pub locate_budget_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_attempts: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            next_control: vec![
                Locator::role("button", Some("next")),
                Locator::css("[aria-label*='next' i], [title*='next' i]"),
                Locator::css("li.next a, a.next, button.next, .pagination-next, .paginate_button.next"),
            ],
            next_triggers: vec![
                Locator::text_exact("Next"),
                Locator::text_exact("›"),
                Locator::text_exact("»"),
                Locator::text_exact(">"),
                Locator::css("[aria-label*='next' i], [title*='next' i]"),
                Locator::css("[class*='chevron-right'], [class*='arrow-right'], [data-icon*='right']"),
                Locator::near(
                    r"\d+\s*[-–]\s*\d+\s+of\s+\d+",
                    "button, a, [role='button']",
                ),
            ],
            fingerprint_rows: vec![
                Locator::css("table tbody tr"),
                Locator::css("[role='row']"),
                Locator::css("table tr"),
            ],
            fingerprint_pattern: r"\b[A-Z]{2,}[-/]?\d{3,}\b|\b\d{6,}\b".to_string(),
            locate_budget_ms: 5_000,
            poll_interval_ms: 500,
            poll_attempts: 20,
        }
    }
}

impl PaginationConfig {
    pub fn locate_budget(&self) -> Duration {
        Duration::from_millis(self.locate_budget_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// One row-collection strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowStrategy {
    pub locator: Locator,
    /// Whether the matched collection can start with a header pseudo-row.
    #[serde(default)]
    pub may_include_header: bool,
}

impl RowStrategy {
    pub fn new(locator: Locator, may_include_header: bool) -> Self {
        Self {
            locator,
            may_include_header,
        }
    }
}

/// Per-page row discovery and per-row download policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub row_strategies: Vec<RowStrategy>,
    /// Rows are accepted once more than this many data rows are visible.
    pub min_row_threshold: usize,
    pub row_retry_attempts: u32,
    pub row_retry_delay_ms: u64,
    /// Download-control strategies evaluated inside each row.
    pub trigger_strategies: Vec<Locator>,
    /// Labels for the final exact, case-insensitive text scan inside a row.
    pub trigger_labels: Vec<String>,
    pub trigger_budget_ms: u64,
    pub transfer_timeout_ms: u64,
    /// Pause after each row so the UI can settle.
    pub settle_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            row_strategies: vec![
                RowStrategy::new(Locator::css("table tbody tr"), false),
                RowStrategy::new(Locator::css(".ag-center-cols-container .ag-row"), false),
                RowStrategy::new(Locator::css("[role='row']"), true),
                RowStrategy::new(Locator::css("table tr"), true),
            ],
            min_row_threshold: 0,
            row_retry_attempts: 10,
            row_retry_delay_ms: 1_000,
            trigger_strategies: vec![
                Locator::role("button", Some("download")),
                Locator::css("[title*='download' i], [aria-label*='download' i]"),
                Locator::css("a[download], [class*='download' i]"),
                Locator::css(".fa-download, .mdi-download, [data-icon*='download']"),
            ],
            trigger_labels: vec!["download".to_string(), "export".to_string()],
            trigger_budget_ms: 5_000,
            transfer_timeout_ms: 30_000,
            settle_ms: 500,
        }
    }
}

impl DownloadConfig {
    pub fn row_retry_delay(&self) -> Duration {
        Duration::from_millis(self.row_retry_delay_ms)
    }

    pub fn trigger_budget(&self) -> Duration {
        Duration::from_millis(self.trigger_budget_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    /// Row-scoped trigger strategies followed by the exact text scan on every label.
    pub fn trigger_chain(&self) -> Vec<Locator> {
        let mut chain = self.trigger_strategies.clone();
        chain.extend(self.trigger_labels.iter().map(Locator::text_exact));
        chain
    }
}

/// Label sets used to pull the metadata block out of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataLabels {
    pub identifier: Vec<String>,
    pub category: Vec<String>,
    pub order_date: Vec<String>,
    pub expiry: Vec<String>,
    pub counterparty_name: Vec<String>,
    pub payment_term: Vec<String>,
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for MetadataLabels {
    fn default() -> Self {
        Self {
            identifier: labels(&["PO No", "PO Number", "Order No", "Order Number", "identifier"]),
            category: labels(&["PO Type", "Order Type", "Category", "category"]),
            order_date: labels(&["PO Date", "Order Date", "orderDate"]),
            expiry: labels(&["Expiry Date", "Validity", "Valid Till", "expiry"]),
            counterparty_name: labels(&[
                "Vendor Name",
                "Supplier Name",
                "Vendor",
                "counterpartyName",
            ]),
            payment_term: labels(&["Payment Terms", "Payment Term", "paymentTerm"]),
        }
    }
}

/// Document layout knowledge for the schema reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// First-cell values of the line-item header row, compared after
    /// lowercasing and stripping whitespace and punctuation.
    pub header_sentinels: Vec<String>,
    /// First-cell substrings that end the line-item block (case-insensitive).
    pub terminal_markers: Vec<String>,
    /// Number of leading rows searched for metadata labels.
    pub anchor_rows: usize,
    pub metadata_labels: MetadataLabels,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            header_sentinels: labels(&["S.No", "Sno", "Sr. No", "Sl. No", "Serial No", "Si No"]),
            terminal_markers: labels(&["total", "important notice"]),
            anchor_rows: 15,
            metadata_labels: MetadataLabels::default(),
        }
    }
}

impl HarvestConfig {
    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn from_json_file(path: &Path) -> HarvestResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Resolve the config file and load it, or return defaults when none exists.
    pub fn load(explicit: Option<&str>) -> HarvestResult<Self> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_json_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay `HARVEST_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("HARVEST_LIST_URL") {
            self.list_url = Some(url);
        }
        if let Ok(dir) = std::env::var("HARVEST_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("HARVEST_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(path));
        }
        if let Ok(dir) = std::env::var("HARVEST_PROFILE_DIR") {
            self.profile_dir = Some(PathBuf::from(dir));
        }
    }

    /// Reject configurations that cannot drive a run.
    pub fn validate(&self) -> HarvestResult<()> {
        Regex::new(&self.pagination.fingerprint_pattern).map_err(|e| {
            HarvestError::Config(format!("invalid fingerprint pattern: {e}"))
        })?;
        if self.download.row_strategies.is_empty() {
            return Err(HarvestError::Config("no row strategies configured".into()));
        }
        if self.download.trigger_chain().is_empty() {
            return Err(HarvestError::Config("no download trigger strategies configured".into()));
        }
        if self.reconcile.header_sentinels.is_empty() {
            return Err(HarvestError::Config("no line-item header sentinels configured".into()));
        }
        if self.output_prefix.trim().is_empty() {
            return Err(HarvestError::Config("output prefix is empty".into()));
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Resolve the config file path.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var("HARVEST_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limit, 0);
        assert_eq!(config.output_format, OutputFormat::Xlsx);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "list_url": "https://portal.example.com/orders",
            "limit": 25,
            "output_format": "csv",
            "download": { "transfer_timeout_ms": 1000 }
        }"#;
        let config: HarvestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.limit, 25);
        assert_eq!(config.output_format, OutputFormat::Csv);
        assert_eq!(config.download.transfer_timeout_ms, 1000);
        assert_eq!(config.download.row_retry_attempts, 10);
        assert!(!config.download.row_strategies.is_empty());
        assert_eq!(config.pagination.poll_attempts, 20);
    }

    #[test]
    fn test_invalid_fingerprint_rejected() {
        let mut config = HarvestConfig::default();
        config.pagination.fingerprint_pattern = "([".to_string();
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_trigger_chain_ends_with_text_scan() {
        let config = DownloadConfig::default();
        let chain = config.trigger_chain();
        assert_eq!(chain.last(), Some(&Locator::text_exact("export")));
        assert_eq!(chain.len(), config.trigger_strategies.len() + 2);
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("pdf".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Xlsx.extension(), "xlsx");
    }

    #[test]
    fn test_explicit_config_path_wins() {
        assert_eq!(
            resolve_config_path(Some("custom.json")),
            Some(PathBuf::from("custom.json"))
        );
    }
}
