// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ordered-fallback element resolution.
//!
//! Callers pass an explicit strategy list, most specific first. Each strategy
//! is polled for a visible match within its share of the time budget; the
//! first visible match wins. Exhausting every strategy is a normal outcome
//! (`Resolution::NotFound`), not an error.

use crate::renderer::{ElementHandle, Locator, RenderContext, Scope};
use std::time::Duration;
use tokio::time::Instant;

/// Smallest time slice any single strategy gets, however large the list.
pub const MIN_ATTEMPT: Duration = Duration::from_millis(250);

/// Interval between visibility polls within one strategy's slice.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of resolving a strategy list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found {
        handle: ElementHandle,
        /// Index of the winning strategy in the caller's list.
        strategy: usize,
    },
    NotFound,
}

impl Resolution {
    pub fn handle(&self) -> Option<ElementHandle> {
        match self {
            Self::Found { handle, .. } => Some(*handle),
            Self::NotFound => None,
        }
    }
}

/// Resolve the first visible element matched by `strategies`, in order.
///
/// A strategy whose query fails is treated like one that matched nothing.
pub async fn resolve(
    ctx: &mut dyn RenderContext,
    scope: Scope,
    strategies: &[Locator],
    budget: Duration,
) -> Resolution {
    if strategies.is_empty() {
        return Resolution::NotFound;
    }
    let slice = (budget / strategies.len() as u32).max(MIN_ATTEMPT);

    for (index, locator) in strategies.iter().enumerate() {
        if let Some(handle) = first_visible_within(ctx, scope, locator, slice).await {
            tracing::debug!(strategy = index, %locator, "locator resolved");
            return Resolution::Found {
                handle,
                strategy: index,
            };
        }
    }

    Resolution::NotFound
}

/// All visible matches of a single locator, without waiting.
pub async fn visible_matches(
    ctx: &mut dyn RenderContext,
    scope: Scope,
    locator: &Locator,
) -> Vec<ElementHandle> {
    let found = match ctx.find_all(scope, locator).await {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!(%locator, "locator query failed: {e:#}");
            return Vec::new();
        }
    };
    let mut visible = Vec::with_capacity(found.len());
    for handle in found {
        if ctx.is_visible(handle).await.unwrap_or(false) {
            visible.push(handle);
        }
    }
    visible
}

async fn first_visible_within(
    ctx: &mut dyn RenderContext,
    scope: Scope,
    locator: &Locator,
    slice: Duration,
) -> Option<ElementHandle> {
    let deadline = Instant::now() + slice;
    loop {
        if let Some(handle) = visible_matches(ctx, scope, locator).await.into_iter().next() {
            return Some(handle);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}
