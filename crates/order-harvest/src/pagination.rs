// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pagination Controller: total-count detection, next-page detection and
//! verified page transitions.
//!
//! Detection is fail-closed. When neither the page text nor a next-page
//! control gives a clear answer, the list is treated as having no further
//! pages. A transition only counts once the first data row's fingerprint
//! token has actually changed.

use crate::config::PaginationConfig;
use crate::locator::{self, Resolution};
use crate::renderer::{RenderContext, Scope};
use crate::types::{HarvestError, HarvestResult};
use regex::Regex;
use std::sync::OnceLock;

/// Number of leading rows searched for a fingerprint token.
const FINGERPRINT_SCAN_ROWS: usize = 5;

/// Which detection rule produced a next-page answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPageRule {
    /// "X of Y pages"
    PagesOf,
    /// "A-B of C"
    Range,
    /// "Page X of Y"
    PageOf,
    /// State of a located next-page control.
    Control,
}

/// Answer to "is there a next page?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPageSignal {
    Decided { exists: bool, rule: NextPageRule },
    /// No rule applied; treated as no next page.
    Inconclusive,
}

impl NextPageSignal {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Decided { exists: true, .. })
    }
}

/// Result of a page-transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The first row's fingerprint changed after the trigger.
    Changed { before: String, after: String },
    /// A trigger fired but the fingerprint stayed the same for every poll.
    Unchanged { fingerprint: String },
    /// No enabled next-page control could be clicked.
    NoTrigger,
    /// No fingerprint was available before acting, so no click was attempted.
    Unverifiable,
}

impl TransitionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Tracks the current page of a list and moves through it.
pub struct PaginationController {
    config: PaginationConfig,
    fingerprint: Regex,
    current_page: u32,
    total_known_count: u64,
}

impl PaginationController {
    /// Build a controller positioned on page 1.
    pub fn new(config: PaginationConfig) -> HarvestResult<Self> {
        let fingerprint = Regex::new(&config.fingerprint_pattern)
            .map_err(|e| HarvestError::Config(format!("invalid fingerprint pattern: {e}")))?;
        Ok(Self {
            config,
            fingerprint,
            current_page: 1,
            total_known_count: 0,
        })
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Last total parsed from the page, 0 when unknown.
    pub fn total_known_count(&self) -> u64 {
        self.total_known_count
    }

    /// Total item count advertised by the page, or 0 when none is shown.
    pub async fn total_count(&mut self, ctx: &mut dyn RenderContext) -> u64 {
        let text = match ctx.page_text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("page text unavailable: {e:#}");
                return 0;
            }
        };
        let total = parse_total(&text).unwrap_or(0);
        if total > 0 {
            self.total_known_count = total;
        }
        total
    }

    /// Decide whether another page follows the current one.
    pub async fn has_next_page(&mut self, ctx: &mut dyn RenderContext) -> NextPageSignal {
        let signal = self.detect_next(ctx).await;
        match signal {
            NextPageSignal::Decided { exists, rule } => {
                tracing::debug!(page = self.current_page, exists, ?rule, "next page detection")
            }
            NextPageSignal::Inconclusive => tracing::info!(
                page = self.current_page,
                "next page detection inconclusive, assuming last page"
            ),
        }
        signal
    }

    async fn detect_next(&mut self, ctx: &mut dyn RenderContext) -> NextPageSignal {
        match ctx.page_text().await {
            Ok(text) => {
                if let Some(total) = parse_total(&text).filter(|t| *t > 0) {
                    self.total_known_count = total;
                }
                if let Some((exists, rule)) = next_from_text(&text) {
                    return NextPageSignal::Decided { exists, rule };
                }
            }
            Err(e) => tracing::debug!("page text unavailable: {e:#}"),
        }

        let resolution = locator::resolve(
            ctx,
            Scope::Page,
            &self.config.next_control,
            self.config.locate_budget(),
        )
        .await;
        let Resolution::Found { handle, .. } = resolution else {
            return NextPageSignal::Inconclusive;
        };
        match ctx.control_state(handle).await {
            Ok(state) => NextPageSignal::Decided {
                exists: !state.is_disabled(),
                rule: NextPageRule::Control,
            },
            Err(e) => {
                tracing::debug!("next control state unreadable: {e:#}");
                NextPageSignal::Inconclusive
            }
        }
    }

    /// Trigger the next page and confirm that the list content changed.
    pub async fn go_to_next_page(&mut self, ctx: &mut dyn RenderContext) -> TransitionOutcome {
        let Some(before) = self.capture_fingerprint(ctx).await else {
            tracing::warn!(
                page = self.current_page,
                "no fingerprint on current page, cannot verify a transition"
            );
            return TransitionOutcome::Unverifiable;
        };

        if !self.trigger_next(ctx).await {
            tracing::info!(page = self.current_page, "no clickable next-page control");
            return TransitionOutcome::NoTrigger;
        }

        for attempt in 1..=self.config.poll_attempts {
            tokio::time::sleep(self.config.poll_interval()).await;
            match self.capture_fingerprint(ctx).await {
                Some(after) if after != before => {
                    self.current_page += 1;
                    tracing::info!(
                        page = self.current_page,
                        attempt,
                        %before,
                        %after,
                        "page transition verified"
                    );
                    return TransitionOutcome::Changed { before, after };
                }
                _ => {}
            }
        }

        tracing::warn!(
            page = self.current_page,
            fingerprint = %before,
            "list content did not change after next-page trigger"
        );
        TransitionOutcome::Unchanged {
            fingerprint: before,
        }
    }

    /// Click the first enabled control found by the trigger strategies.
    async fn trigger_next(&self, ctx: &mut dyn RenderContext) -> bool {
        let triggers = &self.config.next_triggers;
        if triggers.is_empty() {
            return false;
        }
        let slice = self.config.locate_budget() / triggers.len() as u32;

        for (index, trigger) in triggers.iter().enumerate() {
            let resolution =
                locator::resolve(ctx, Scope::Page, std::slice::from_ref(trigger), slice).await;
            let Some(handle) = resolution.handle() else {
                continue;
            };
            if let Ok(state) = ctx.control_state(handle).await {
                if state.is_disabled() {
                    tracing::debug!(strategy = index, %trigger, "next control disabled");
                    continue;
                }
            }
            match ctx.click(handle).await {
                Ok(()) => {
                    tracing::debug!(strategy = index, %trigger, "next page triggered");
                    return true;
                }
                Err(e) => tracing::debug!(strategy = index, %trigger, "click failed: {e:#}"),
            }
        }
        false
    }

    /// Fingerprint token from the first data row that carries one.
    async fn capture_fingerprint(&self, ctx: &mut dyn RenderContext) -> Option<String> {
        for rows in &self.config.fingerprint_rows {
            let handles = locator::visible_matches(ctx, Scope::Page, rows).await;
            for handle in handles.into_iter().take(FINGERPRINT_SCAN_ROWS) {
                let Ok(text) = ctx.text_of(handle).await else {
                    continue;
                };
                if let Some(token) = self.fingerprint.find(&text) {
                    return Some(token.as_str().to_string());
                }
            }
        }
        None
    }
}

fn pages_of_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+)\s*of\s*(\d+)\s*pages?\b").expect("pages-of regex is valid")
    })
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d[\d,]*)\s*[-–—]\s*(\d[\d,]*)\s+of\s+(\d[\d,]*)")
            .expect("range regex is valid")
    })
}

fn page_of_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bpage\s+(\d+)\s+of\s+(\d+)").expect("page-of regex is valid")
    })
}

fn total_res() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?i)showing\s+\d[\d,]*\s*[-–—]\s*\d[\d,]*\s+of\s+(\d[\d,]*)")
                .expect("showing regex is valid"),
            Regex::new(r"(?i)\bof\s+(\d[\d,]*)\s+(?:items|results|records|entries)\b")
                .expect("of-items regex is valid"),
            Regex::new(r"(?i)\bof\s+(\d[\d,]*)\b").expect("of-n regex is valid"),
        ]
    })
}

fn number(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}

/// First total parsed from `text` by the ordered total-count patterns.
pub fn parse_total(text: &str) -> Option<u64> {
    total_res()
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| number(&c[1])))
}

/// Next-page answer from the three text rules, in order.
pub fn next_from_text(text: &str) -> Option<(bool, NextPageRule)> {
    if let Some(c) = pages_of_re().captures(text) {
        if let (Some(x), Some(y)) = (number(&c[1]), number(&c[2])) {
            return Some((x < y, NextPageRule::PagesOf));
        }
    }
    if let Some(c) = range_re().captures(text) {
        if let (Some(end), Some(total)) = (number(&c[2]), number(&c[3])) {
            return Some((end < total, NextPageRule::Range));
        }
    }
    if let Some(c) = page_of_re().captures(text) {
        if let (Some(x), Some(y)) = (number(&c[1]), number(&c[2])) {
            return Some((x < y, NextPageRule::PageOf));
        }
    }
    None
}
