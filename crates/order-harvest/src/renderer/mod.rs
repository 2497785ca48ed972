// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser capability abstraction.
//!
//! Defines the `Renderer`, `RenderContext` and `Download` traits that the
//! harvesting stages are written against. The production implementation is
//! Chromium via chromiumoxide; tests drive the same stages with an in-memory
//! page model.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Whether the full load event fired before the timeout. When false the
    /// page was accepted on the lighter DOM-ready signal.
    pub fully_loaded: bool,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Opaque reference to an element located in the current page.
///
/// Handles are only meaningful to the context that issued them and become
/// stale when the page re-renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

/// Where a locator is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The whole document.
    Page,
    /// The subtree rooted at an element.
    Element(ElementHandle),
}

/// One element-locating strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// CSS selector.
    Css { selector: String },
    /// XPath expression, evaluated relative to the scope.
    XPath { expr: String },
    /// Full-subtree text scan, case-insensitive. `exact` compares the
    /// trimmed element text for equality, otherwise substring containment.
    Text { text: String, exact: bool },
    /// ARIA role with an optional accessible-name filter (case-insensitive substring).
    Role { role: String, name: Option<String> },
    /// DOM-proximity search: for each element whose own text matches the
    /// regex `anchor`, the last element matching `target` (CSS) inside the
    /// closest ancestor that contains one. Pagination bars put "next" last.
    Near { anchor: String, target: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath { expr: expr.into() }
    }

    pub fn text_exact(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: true,
        }
    }

    pub fn role(role: impl Into<String>, name: Option<&str>) -> Self {
        Self::Role {
            role: role.into(),
            name: name.map(str::to_string),
        }
    }

    pub fn near(anchor: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Near {
            anchor: anchor.into(),
            target: target.into(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css { selector } => write!(f, "css({selector})"),
            Self::XPath { expr } => write!(f, "xpath({expr})"),
            Self::Text { text, exact: true } => write!(f, "text(={text})"),
            Self::Text { text, exact: false } => write!(f, "text(~{text})"),
            Self::Role { role, name: Some(n) } => write!(f, "role({role}, {n})"),
            Self::Role { role, name: None } => write!(f, "role({role})"),
            Self::Near { anchor, target } => write!(f, "near({anchor} -> {target})"),
        }
    }
}

/// The disabled-state signals of an interactive control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub disabled_attr: bool,
    pub disabled_class: bool,
    pub aria_disabled: bool,
    /// Computed opacity, when the element sets one.
    pub opacity: Option<f64>,
    pub pointer_events_none: bool,
}

impl ControlState {
    /// A control is disabled if any signal says so.
    pub fn is_disabled(&self) -> bool {
        self.disabled_attr
            || self.disabled_class
            || self.aria_disabled
            || self.pointer_events_none
            || self.opacity.is_some_and(|o| o < 0.5)
    }
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab) whose downloads land in `download_dir`.
    async fn new_context(&self, download_dir: &Path) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&mut self) -> Result<()>;
}

/// A single browser context (tab). Every call may time out; callers decide
/// whether a failure is fatal.
#[async_trait]
pub trait RenderContext: Send {
    /// Navigate to a URL, waiting for load completion and falling back to the
    /// DOM-ready signal on timeout.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Visible text of the whole page.
    async fn page_text(&mut self) -> Result<String>;
    /// All elements matching `locator` within `scope`, in document order.
    async fn find_all(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementHandle>>;
    /// Whether the element is rendered with a non-empty box.
    async fn is_visible(&mut self, element: ElementHandle) -> Result<bool>;
    /// Visible text of an element's subtree.
    async fn text_of(&mut self, element: ElementHandle) -> Result<String>;
    /// Drop every element handle issued so far. Handles returned before the
    /// call become stale.
    async fn release_handles(&mut self);
    /// Disabled-state signals of a control.
    async fn control_state(&mut self, element: ElementHandle) -> Result<ControlState>;
    /// Click an element.
    async fn click(&mut self, element: ElementHandle) -> Result<()>;
    /// Click an element and wait up to `timeout` for the download it starts.
    async fn click_for_download(
        &mut self,
        element: ElementHandle,
        timeout: Duration,
    ) -> std::result::Result<Box<dyn Download>, TransferError>;
    /// Save a screenshot of the current page.
    async fn screenshot(&mut self, path: &Path) -> Result<()>;
    /// Get the current URL.
    async fn current_url(&mut self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Why a click produced no completed download.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("click failed: {0:#}")]
    Click(anyhow::Error),
    #[error("no download completed within {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("download failed: {0:#}")]
    Failed(anyhow::Error),
}

/// A completed artifact transfer awaiting persistence.
#[async_trait]
pub trait Download: Send {
    /// File name suggested by the server, possibly empty.
    fn suggested_name(&self) -> &str;
    /// Persist the artifact at `dest`.
    async fn save(self: Box<Self>, dest: &Path) -> Result<()>;
}

/// Brings a fresh context to the authenticated list page.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn prepare(&self, ctx: &mut dyn RenderContext) -> Result<()>;
}

/// Relies on a persistent browser profile that already holds a logged-in
/// session, and only navigates to the list page.
pub struct ProfileSession {
    pub list_url: String,
    pub timeout: Duration,
}

#[async_trait]
impl Authenticator for ProfileSession {
    async fn prepare(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        let nav = ctx.navigate(&self.list_url, self.timeout).await?;
        tracing::info!(
            url = %nav.final_url,
            fully_loaded = nav.fully_loaded,
            load_ms = nav.load_time_ms,
            "list page opened"
        );
        Ok(())
    }
}
