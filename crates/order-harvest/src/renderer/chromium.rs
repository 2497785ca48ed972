// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.
//!
//! Non-CSS locators are evaluated in page JavaScript, which tags every match
//! with a one-off `data-oh-mark` attribute; the tagged nodes are then fetched
//! as real element handles through a CSS query.

use super::{
    ControlState, Download, ElementHandle, Locator, NavigationResult, RenderContext, Renderer,
    Scope, TransferError,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Extra time granted to the DOM-ready fallback after a load timeout.
const READY_FALLBACK: Duration = Duration::from_secs(5);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. HARVEST_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("HARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.order-harvest/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".order-harvest/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".order-harvest/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".order-harvest/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".order-harvest/chromium/chrome-linux64/chrome"),
                home.join(".order-harvest/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch options for [`ChromiumRenderer`].
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Explicit browser binary; discovered with [`find_chromium`] when unset.
    pub chromium_path: Option<PathBuf>,
    /// Persistent profile directory carrying an authenticated session.
    pub profile_dir: Option<PathBuf>,
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let chrome_path = match &options.chromium_path {
            Some(p) => p.clone(),
            None => find_chromium()
                .context("Chromium not found. Set HARVEST_CHROMIUM_PATH or install Chrome.")?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        if let Some(dir) = &options.profile_dir {
            builder = builder.user_data_dir(dir);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self { browser, handler })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, download_dir: &Path) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        tokio::fs::create_dir_all(download_dir).await?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(download_dir.to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(|e| anyhow!("invalid download behavior: {e}"))?;
        page.execute(params)
            .await
            .context("failed to route downloads")?;

        Ok(Box::new(ChromiumContext {
            page,
            download_dir: download_dir.to_path_buf(),
            elements: HashMap::new(),
            next_id: 0,
            next_mark: 0,
        }))
    }

    async fn shutdown(&mut self) -> Result<()> {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    download_dir: PathBuf,
    elements: HashMap<u64, Element>,
    next_id: u64,
    next_mark: u64,
}

impl ChromiumContext {
    fn element(&self, handle: ElementHandle) -> Result<&Element> {
        self.elements
            .get(&handle.0)
            .ok_or_else(|| anyhow!("stale element handle {}", handle.0))
    }

    fn register(&mut self, found: Vec<Element>) -> Vec<ElementHandle> {
        found
            .into_iter()
            .map(|el| {
                self.next_id += 1;
                self.elements.insert(self.next_id, el);
                ElementHandle(self.next_id)
            })
            .collect()
    }

    async fn eval_string(&self, expr: &str) -> Result<String> {
        let result = self
            .page
            .evaluate(expr)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn call_on(&self, handle: ElementHandle, function: &str) -> Result<serde_json::Value> {
        let returns = self
            .element(handle)?
            .call_js_fn(function, false)
            .await
            .context("element function call failed")?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn css_query(&self, scope: Scope, selector: &str) -> Result<Vec<Element>> {
        // find_elements fails when nothing matches; that is an empty result here.
        let found = match scope {
            Scope::Page => self.page.find_elements(selector).await,
            Scope::Element(h) => self.element(h)?.find_elements(selector).await,
        };
        Ok(found.unwrap_or_default())
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();
        self.elements.clear();

        let fully_loaded = match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => {
                tracing::warn!(url, "load event timed out, waiting for DOM ready");
                let deadline = Instant::now() + READY_FALLBACK;
                loop {
                    let state = self
                        .eval_string("document.readyState")
                        .await
                        .unwrap_or_default();
                    if state == "interactive" || state == "complete" {
                        break;
                    }
                    if Instant::now() >= deadline {
                        bail!("navigation timed out after {}ms", timeout.as_millis());
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                false
            }
        };

        let final_url = self.current_url().await.unwrap_or_else(|_| url.to_string());
        Ok(NavigationResult {
            final_url,
            fully_loaded,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn page_text(&mut self) -> Result<String> {
        self.eval_string("document.body ? document.body.innerText : ''")
            .await
    }

    async fn find_all(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let found = match locator {
            Locator::Css { selector } => self.css_query(scope, selector).await?,
            other => {
                self.next_mark += 1;
                let mark = format!("m{}", self.next_mark);
                let body = marking_body(other, &mark);
                match scope {
                    Scope::Page => {
                        let script = format!("(() => {{ const root = document; {body} }})()");
                        self.page
                            .evaluate(script.as_str())
                            .await
                            .context("locator script failed")?;
                    }
                    Scope::Element(h) => {
                        let function = format!("function() {{ const root = this; {body} }}");
                        self.call_on(h, &function).await?;
                    }
                }
                let selector = format!("[data-oh-mark=\"{mark}\"]");
                self.css_query(Scope::Page, &selector).await?
            }
        };
        Ok(self.register(found))
    }

    async fn is_visible(&mut self, element: ElementHandle) -> Result<bool> {
        let value = self
            .call_on(
                element,
                "function() {
                    const r = this.getBoundingClientRect();
                    const s = window.getComputedStyle(this);
                    return r.width > 0 && r.height > 0
                        && s.visibility !== 'hidden' && s.display !== 'none';
                }",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text_of(&mut self, element: ElementHandle) -> Result<String> {
        let text = self
            .element(element)?
            .inner_text()
            .await
            .context("failed to read element text")?;
        Ok(text.unwrap_or_default())
    }

    async fn release_handles(&mut self) {
        self.elements.clear();
    }

    async fn control_state(&mut self, element: ElementHandle) -> Result<ControlState> {
        let value = self
            .call_on(
                element,
                "function() {
                    const holder = this.closest('li') || this;
                    const cls = ((this.className || '') + ' ' + (holder.className || '')).toString();
                    const s = window.getComputedStyle(this);
                    const inline = this.style && this.style.opacity;
                    return JSON.stringify({
                        disabled_attr: this.hasAttribute('disabled'),
                        disabled_class: /\\bdisabled\\b/i.test(cls),
                        aria_disabled: (this.getAttribute('aria-disabled') || '').toLowerCase() === 'true',
                        opacity: inline ? parseFloat(inline) : parseFloat(s.opacity),
                        pointer_events_none: s.pointerEvents === 'none',
                    });
                }",
            )
            .await?;
        parse_control_state(&value)
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        let el = self.element(element)?;
        el.scroll_into_view().await.ok();
        el.click().await.context("click failed")?;
        Ok(())
    }

    async fn click_for_download(
        &mut self,
        element: ElementHandle,
        timeout: Duration,
    ) -> std::result::Result<Box<dyn Download>, TransferError> {
        // Subscribe before clicking so the begin event cannot be missed.
        let mut begins = self
            .page
            .event_listener::<EventDownloadWillBegin>()
            .await
            .context("failed to listen for downloads")
            .map_err(TransferError::Failed)?;
        let mut progress = self
            .page
            .event_listener::<EventDownloadProgress>()
            .await
            .context("failed to listen for download progress")
            .map_err(TransferError::Failed)?;

        self.click(element).await.map_err(TransferError::Click)?;

        let (guid, suggested) =
            tokio::time::timeout(timeout, await_transfer(&mut begins, &mut progress))
                .await
                .map_err(|_| TransferError::Timeout(timeout))?
                .map_err(TransferError::Failed)?;

        Ok(Box::new(ChromiumDownload {
            staged: self.download_dir.join(guid),
            suggested,
        }))
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .context("screenshot failed")?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}

/// Decode the serialized state returned by the control-state script.
///
/// Element calls are not made by value, so object results arrive without a
/// payload; the script returns a JSON string instead.
fn parse_control_state(value: &serde_json::Value) -> Result<ControlState> {
    let payload = value
        .as_str()
        .ok_or_else(|| anyhow!("control state script returned {value}"))?;
    serde_json::from_str(payload).context("unexpected control state payload")
}

/// Wait for the next download to begin, then for that download to complete.
async fn await_transfer<B, P>(begins: &mut B, progress: &mut P) -> Result<(String, String)>
where
    B: Stream<Item = Arc<EventDownloadWillBegin>> + Unpin,
    P: Stream<Item = Arc<EventDownloadProgress>> + Unpin,
{
    let begin = begins
        .next()
        .await
        .ok_or_else(|| anyhow!("download event stream closed"))?;
    let guid = begin.guid.clone();
    while let Some(event) = progress.next().await {
        if event.guid != guid {
            continue;
        }
        match event.state {
            DownloadProgressState::Completed => {
                return Ok((guid, begin.suggested_filename.clone()))
            }
            DownloadProgressState::Canceled => bail!("download {guid} was canceled"),
            _ => {}
        }
    }
    bail!("download progress stream closed")
}

/// A finished Chromium download, staged under its GUID in the download dir.
struct ChromiumDownload {
    staged: PathBuf,
    suggested: String,
}

#[async_trait]
impl Download for ChromiumDownload {
    fn suggested_name(&self) -> &str {
        &self.suggested
    }

    async fn save(self: Box<Self>, dest: &Path) -> Result<()> {
        if tokio::fs::rename(&self.staged, dest).await.is_err() {
            tokio::fs::copy(&self.staged, dest)
                .await
                .with_context(|| format!("failed to save download to {}", dest.display()))?;
            let _ = tokio::fs::remove_file(&self.staged).await;
        }
        Ok(())
    }
}

/// JavaScript that collects matches of `locator` under `root` and tags them with `mark`.
fn marking_body(locator: &Locator, mark: &str) -> String {
    let collect = match locator {
        Locator::Css { selector } => {
            format!("const found = [...root.querySelectorAll({})];", js_str(selector))
        }
        Locator::XPath { expr } => format!(
            "const snap = document.evaluate({}, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
             const found = [];
             for (let i = 0; i < snap.snapshotLength; i++) found.push(snap.snapshotItem(i));",
            js_str(expr)
        ),
        Locator::Text { text, exact } => format!(
            "const needle = {}.trim().toLowerCase();
             const norm = el => (el.innerText || el.textContent || '').trim().toLowerCase();
             const hit = el => {} ? norm(el) === needle : norm(el).includes(needle);
             let found = [...root.querySelectorAll('*')].filter(hit);
             found = found.filter(el => ![...el.children].some(c => hit(c)));",
            js_str(text),
            exact
        ),
        Locator::Role { role, name } => {
            let implicit = match role.as_str() {
                "button" => ", button, input[type=button], input[type=submit]",
                "link" => ", a[href]",
                "row" => ", tr",
                _ => "",
            };
            let selector = format!("[role=\"{role}\"]{implicit}");
            format!(
                "const want = {};
                 const found = [...root.querySelectorAll({})].filter(el => {{
                     if (want === null) return true;
                     const label = (el.getAttribute('aria-label') || el.innerText || el.value || '').toLowerCase();
                     return label.includes(want.toLowerCase());
                 }});",
                name.as_deref().map(js_str).unwrap_or_else(|| "null".to_string()),
                js_str(&selector)
            )
        }
        Locator::Near { anchor, target } => format!(
            "const re = new RegExp({}, 'i');
             const txt = el => (el.innerText || '').trim();
             const anchors = [...root.querySelectorAll('*')]
                 .filter(el => re.test(txt(el)) && ![...el.children].some(c => re.test(txt(c))));
             const found = [];
             for (const a of anchors) {{
                 let p = a.parentElement;
                 for (let d = 0; p && d < 4; d++, p = p.parentElement) {{
                     const hits = [...p.querySelectorAll({})];
                     if (hits.length) {{ found.push(hits[hits.length - 1]); break; }}
                 }}
             }}",
            js_str(anchor),
            js_str(target)
        ),
    };
    format!(
        "{collect}
         found.forEach(el => el.setAttribute('data-oh-mark', {}));
         return found.length;",
        js_str(mark)
    )
}

/// Encode `s` as a JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
