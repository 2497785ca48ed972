// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory order list used by the integration tests.
//!
//! `FakePage` models a paginated table of orders. Each data row has an
//! order id (`PO-1001`, `PO-1002`, ...) and, unless configured otherwise, a
//! download button whose artifact is a small CSV order document. A "Next"
//! button advances the page and is disabled on the last one.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use order_harvest::renderer::{
    ControlState, Download, ElementHandle, Locator, NavigationResult, RenderContext, Scope,
    TransferError,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ROW_SELECTOR: &str = "table tbody tr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Row { page: usize, idx: usize },
    Header,
    HeaderCell,
    DownloadButton { page: usize, idx: usize },
    NextButton,
}

pub struct FakePage {
    pages: usize,
    rows_per_page: usize,
    current: usize,
    range_text: bool,
    row_selector: String,
    header_in_rows: bool,
    stuck: bool,
    missing_triggers: HashSet<(usize, usize)>,
    failing_transfers: HashSet<(usize, usize)>,
    row_queries_before_render: usize,
    handles: HashMap<u64, Node>,
    next_handle: u64,
    /// Order ids whose download button was clicked, in click order.
    pub attempted: Vec<String>,
    pub next_clicks: usize,
    pub navigations: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub handle_releases: usize,
}

impl FakePage {
    pub fn new(pages: usize, rows_per_page: usize) -> Self {
        Self {
            pages,
            rows_per_page,
            current: 0,
            range_text: true,
            row_selector: ROW_SELECTOR.to_string(),
            header_in_rows: false,
            stuck: false,
            missing_triggers: HashSet::new(),
            failing_transfers: HashSet::new(),
            row_queries_before_render: 0,
            handles: HashMap::new(),
            next_handle: 1,
            attempted: Vec::new(),
            next_clicks: 0,
            navigations: Vec::new(),
            screenshots: Vec::new(),
            handle_releases: 0,
        }
    }

    /// Drop the "Showing A-B of C" caption so only the Next button tells.
    pub fn without_range_text(mut self) -> Self {
        self.range_text = false;
        self
    }

    /// Serve rows under `selector`, preceded by a `th` header row.
    pub fn with_header_row(mut self, selector: &str) -> Self {
        self.row_selector = selector.to_string();
        self.header_in_rows = true;
        self
    }

    /// The Next button is clickable but the list never re-renders.
    pub fn stuck_on_next(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// Row `row` of page `page` (both 1-based) has no download control.
    pub fn missing_trigger(mut self, page: usize, row: usize) -> Self {
        self.missing_triggers.insert((page - 1, row - 1));
        self
    }

    /// Row `row` of page `page` (both 1-based) never finishes its download.
    pub fn failing_transfer(mut self, page: usize, row: usize) -> Self {
        self.failing_transfers.insert((page - 1, row - 1));
        self
    }

    /// The table is empty for the first `queries` row lookups.
    pub fn render_after(mut self, queries: usize) -> Self {
        self.row_queries_before_render = queries;
        self
    }

    /// 1-based number of the page currently shown.
    pub fn page_number(&self) -> usize {
        self.current + 1
    }

    pub fn total_rows(&self) -> usize {
        self.pages * self.rows_per_page
    }

    fn order_number(&self, page: usize, idx: usize) -> usize {
        page * self.rows_per_page + idx + 1
    }

    pub fn order_id(n: usize) -> String {
        format!("PO-{}", 1000 + n)
    }

    /// Handles currently held by the page.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Handles issued since the page was created.
    pub fn issued_handles(&self) -> usize {
        (self.next_handle - 1) as usize
    }

    fn issue(&mut self, node: Node) -> ElementHandle {
        let id = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(id, node);
        ElementHandle(id)
    }

    fn node(&self, handle: ElementHandle) -> Result<Node> {
        match self.handles.get(&handle.0) {
            Some(node) => Ok(*node),
            None => bail!("unknown element handle {}", handle.0),
        }
    }

    fn on_last_page(&self) -> bool {
        self.current + 1 >= self.pages
    }

    fn page_rows(&mut self) -> Vec<ElementHandle> {
        if self.row_queries_before_render > 0 {
            self.row_queries_before_render -= 1;
            return Vec::new();
        }
        let mut out = Vec::new();
        if self.header_in_rows {
            out.push(self.issue(Node::Header));
        }
        let page = self.current;
        for idx in 0..self.rows_per_page {
            out.push(self.issue(Node::Row { page, idx }));
        }
        out
    }
}

/// CSV order document for order number `n`: metadata block, two line
/// items, and a total row.
pub fn order_document(n: usize) -> String {
    format!(
        "PO No,{id}\nPO Type,Goods\nVendor Name,Vendor {n}\n\nS.No,Item,Qty\n1,Bolt,{a}\n2,Nut,{b}\nTotal,,{c}\n",
        id = FakePage::order_id(n),
        a = n,
        b = n * 2,
        c = n * 3,
    )
}

#[async_trait]
impl RenderContext for FakePage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<NavigationResult> {
        self.navigations.push(url.to_string());
        Ok(NavigationResult {
            final_url: url.to_string(),
            fully_loaded: true,
            load_time_ms: 1,
        })
    }

    async fn page_text(&mut self) -> Result<String> {
        if !self.range_text {
            return Ok("Purchase Orders\nDownload all".to_string());
        }
        let first = self.current * self.rows_per_page + 1;
        let last = first + self.rows_per_page - 1;
        Ok(format!(
            "Purchase Orders\nShowing {first}-{last} of {}",
            self.total_rows()
        ))
    }

    async fn find_all(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementHandle>> {
        match scope {
            Scope::Page => match locator {
                Locator::Css { selector } if *selector == self.row_selector => Ok(self.page_rows()),
                Locator::Text { text, exact: true } if text == "Next" => {
                    Ok(vec![self.issue(Node::NextButton)])
                }
                Locator::Role {
                    role,
                    name: Some(name),
                } if role == "button" && name == "next" => Ok(vec![self.issue(Node::NextButton)]),
                _ => Ok(Vec::new()),
            },
            Scope::Element(handle) => match (self.node(handle)?, locator) {
                (Node::Header, Locator::Css { selector }) if selector.contains("th") => {
                    Ok(vec![self.issue(Node::HeaderCell)])
                }
                (
                    Node::Row { page, idx },
                    Locator::Role {
                        role,
                        name: Some(name),
                    },
                ) if role == "button" && name == "download" => {
                    if self.missing_triggers.contains(&(page, idx)) {
                        Ok(Vec::new())
                    } else {
                        Ok(vec![self.issue(Node::DownloadButton { page, idx })])
                    }
                }
                _ => Ok(Vec::new()),
            },
        }
    }

    async fn is_visible(&mut self, element: ElementHandle) -> Result<bool> {
        self.node(element).map(|_| true)
    }

    async fn text_of(&mut self, element: ElementHandle) -> Result<String> {
        Ok(match self.node(element)? {
            Node::Row { page, idx } => {
                let n = self.order_number(page, idx);
                format!("{}  Vendor {n}  Download", Self::order_id(n))
            }
            Node::Header => "S.No  PO Number  Vendor  Action".to_string(),
            Node::HeaderCell => "PO Number".to_string(),
            Node::DownloadButton { .. } => "Download".to_string(),
            Node::NextButton => "Next".to_string(),
        })
    }

    async fn release_handles(&mut self) {
        self.handles.clear();
        self.handle_releases += 1;
    }

    async fn control_state(&mut self, element: ElementHandle) -> Result<ControlState> {
        Ok(match self.node(element)? {
            Node::NextButton => ControlState {
                disabled_attr: self.on_last_page(),
                ..Default::default()
            },
            _ => ControlState::default(),
        })
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        if let Node::NextButton = self.node(element)? {
            self.next_clicks += 1;
            if !self.stuck && !self.on_last_page() {
                self.current += 1;
            }
        }
        Ok(())
    }

    async fn click_for_download(
        &mut self,
        element: ElementHandle,
        timeout: Duration,
    ) -> std::result::Result<Box<dyn Download>, TransferError> {
        let (page, idx) = match self.node(element).map_err(TransferError::Click)? {
            Node::DownloadButton { page, idx } => (page, idx),
            other => {
                return Err(TransferError::Click(anyhow::anyhow!(
                    "{other:?} is not a download control"
                )))
            }
        };
        let n = self.order_number(page, idx);
        self.attempted.push(Self::order_id(n));
        if self.failing_transfers.contains(&(page, idx)) {
            return Err(TransferError::Timeout(timeout));
        }
        Ok(Box::new(FakeDownload {
            suggested: format!("{}.csv", Self::order_id(n)),
            body: order_document(n),
        }))
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        std::fs::write(path, b"png")?;
        self.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(format!("https://portal.test/orders?page={}", self.page_number()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct FakeDownload {
    suggested: String,
    body: String,
}

#[async_trait]
impl Download for FakeDownload {
    fn suggested_name(&self) -> &str {
        &self.suggested
    }

    async fn save(self: Box<Self>, dest: &Path) -> Result<()> {
        tokio::fs::write(dest, self.body).await?;
        Ok(())
    }
}
