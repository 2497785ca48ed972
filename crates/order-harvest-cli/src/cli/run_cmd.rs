// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! `order-harvest run`: browser session, downloads, merge.

use anyhow::{Context, Result};
use order_harvest::config::HarvestConfig;
use order_harvest::harvest::capture_diagnostics;
use order_harvest::progress::{self, Progress};
use order_harvest::renderer::chromium::{BrowserOptions, ChromiumRenderer};
use order_harvest::{Harvester, ProfileSession, Renderer, WorkDir};

use super::output;

pub async fn run(config: HarvestConfig, json: bool) -> Result<()> {
    let list_url = config.list_url.clone().context(
        "no list URL: pass --url, set HARVEST_LIST_URL, or add list_url to the config file",
    )?;

    let (tx, rx) = progress::channel();
    let harvester = Harvester::new(config, Progress::new(Some(tx)))?;
    let config = harvester.config();
    let printer = output::spawn_progress_printer(rx);

    let options = BrowserOptions {
        headless: config.headless,
        chromium_path: config.chromium_path.clone(),
        profile_dir: config.profile_dir.clone(),
    };
    tracing::info!(url = %list_url, limit = config.limit, "starting harvest");
    let mut renderer = ChromiumRenderer::launch(&options).await?;

    let work = match WorkDir::create(&config.output_dir) {
        Ok(work) => work,
        Err(e) => {
            let _ = renderer.shutdown().await;
            return Err(e)
                .with_context(|| format!("cannot create {}", config.output_dir.display()));
        }
    };
    let work_path = work.path().to_path_buf();
    let mut ctx = match renderer.new_context(&work_path).await {
        Ok(ctx) => ctx,
        Err(e) => {
            work.remove();
            let _ = renderer.shutdown().await;
            return Err(e);
        }
    };

    let auth = ProfileSession {
        list_url,
        timeout: config.navigation_timeout(),
    };
    let result = harvester.run(&mut *ctx, &auth, work).await;

    if result.is_err() {
        capture_diagnostics(&mut *ctx, &config.diagnostics_dir).await;
        if work_path.exists() {
            tracing::warn!(
                dir = %work_path.display(),
                "downloaded documents kept; merge them with `order-harvest merge`"
            );
        }
    }
    if let Err(e) = ctx.close().await {
        tracing::debug!("closing browser context: {e:#}");
    }
    if let Err(e) = renderer.shutdown().await {
        tracing::debug!("shutting down browser: {e:#}");
    }

    // Dropping the harvester closes the channel so the printer drains and exits.
    drop(harvester);
    let _ = printer.await;

    let summary = result?;
    output::print_summary(&summary, json)
}
