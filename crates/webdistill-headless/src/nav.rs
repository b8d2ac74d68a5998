//! Shared navigation + `wait_until` + scroll-to-bottom logic used by both
//! `headless_browser` and `browser_attach` (spec §4.4.2, §4.4.4: "otherwise
//! identical wait semantics to `headless_browser`").

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use webdistill_types::WaitUntil;

/// Navigate `page` to `url` and block until `wait_until` is satisfied or
/// `timeout` elapses, whichever comes first. Errors are folded into a
/// plain `String` — the caller maps them to `ErrorKind::FetcherInternal` or
/// a timeout-specific kind as appropriate.
pub async fn goto_and_wait(page: &Page, url: &str, wait_until: &WaitUntil, timeout: Duration) -> Result<(), String> {
    let deadline = Instant::now() + timeout;

    page.goto(url)
        .await
        .map_err(|e| format!("navigation failed: {e}"))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| format!("DOMContentLoaded wait failed: {e}"))?;

    match wait_until {
        WaitUntil::DomLoaded => Ok(()),
        WaitUntil::CustomDelayMs(ms) => {
            tokio::time::sleep(remaining(deadline, Duration::from_millis(*ms))).await;
            Ok(())
        }
        WaitUntil::NetworkIdle => wait_for_network_idle(page, deadline).await,
        WaitUntil::SelectorVisible(selector) => wait_for_selector_visible(page, selector, deadline).await,
    }
}

/// Sleep for `wanted`, but never past `deadline`.
fn remaining(deadline: Instant, wanted: Duration) -> Duration {
    let left = deadline.saturating_duration_since(Instant::now());
    wanted.min(left)
}

/// Poll `document.readyState` plus a quiet-network heuristic: since
/// chromiumoxide doesn't expose a raw "last network activity" timestamp
/// without wiring up CDP network events directly, this approximates
/// network idleness by polling `performance.getEntriesByType('resource')`
/// length until it stops growing for 500 ms, capped at the deadline.
async fn wait_for_network_idle(page: &Page, deadline: Instant) -> Result<(), String> {
    let quiet_window = Duration::from_millis(500);
    let mut last_count = resource_entry_count(page).await;
    let mut quiet_since = Instant::now();

    loop {
        if Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let count = resource_entry_count(page).await;
        if count == last_count {
            if quiet_since.elapsed() >= quiet_window {
                return Ok(());
            }
        } else {
            last_count = count;
            quiet_since = Instant::now();
        }
    }
}

async fn resource_entry_count(page: &Page) -> usize {
    page.evaluate("performance.getEntriesByType('resource').length")
        .await
        .ok()
        .and_then(|v| v.into_value::<usize>().ok())
        .unwrap_or(0)
}

async fn wait_for_selector_visible(page: &Page, selector: &str, deadline: Instant) -> Result<(), String> {
    loop {
        if Instant::now() >= deadline {
            return Err(format!("selector {selector:?} did not become visible before timeout"));
        }
        let script = format!(
            "(() => {{ const el = document.querySelector({selector:?}); if (!el) return false; const r = el.getBoundingClientRect(); return r.width > 0 && r.height > 0; }})()"
        );
        let visible = page
            .evaluate(script)
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false);
        if visible {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Progressive scroll to trigger lazy-loaded content: scroll to
/// `scrollHeight`, wait 500 ms, repeat until `scrollHeight` stabilizes or
/// half the remaining timeout budget elapses (spec §4.4.2).
pub async fn scroll_to_bottom(page: &Page, budget: Duration) -> Result<(), String> {
    let deadline = Instant::now() + budget;
    let mut last_height = scroll_height(page).await;

    loop {
        if Instant::now() >= deadline {
            return Ok(());
        }
        page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(|e| format!("scroll failed: {e}"))?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let height = scroll_height(page).await;
        if height == last_height {
            return Ok(());
        }
        last_height = height;
    }
}

async fn scroll_height(page: &Page) -> i64 {
    page.evaluate("document.body.scrollHeight")
        .await
        .ok()
        .and_then(|v| v.into_value::<i64>().ok())
        .unwrap_or(0)
}

/// Serialize the full DOM per spec: `document.documentElement.outerHTML`.
pub async fn outer_html(page: &Page) -> Result<String, String> {
    page.evaluate("document.documentElement.outerHTML")
        .await
        .map_err(|e| format!("outerHTML read failed: {e}"))?
        .into_value::<String>()
        .map_err(|e| format!("outerHTML was not a string: {e}"))
}
