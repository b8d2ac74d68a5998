//! The `headless_browser` fetcher (spec §4.4.2).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::BrowserConfig;
use webdistill_fetch::{truncate_body, Fetcher};
use webdistill_types::{ErrorKind, FetchContext, FetchPlan, FetchResult};

use crate::nav;
use crate::pool::{BrowserPool, BrowserPoolConfig};

const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct HeadlessBrowserFetcher {
    pool: BrowserPool,
    max_body_bytes: usize,
}

impl HeadlessBrowserFetcher {
    pub fn new(config: BrowserPoolConfig) -> Self {
        Self::with_max_body_bytes(config, DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_max_body_bytes(config: BrowserPoolConfig, max_body_bytes: usize) -> Self {
        let pool = BrowserPool::new(config, || {
            BrowserConfig::builder()
                .no_sandbox()
                .build()
                .expect("hardcoded headless BrowserConfig must build")
        });
        Self { pool, max_body_bytes }
    }
}

#[async_trait]
impl Fetcher for HeadlessBrowserFetcher {
    fn id(&self) -> &'static str {
        "headless_browser"
    }

    async fn fetch(&self, ctx: &FetchContext, plan: &FetchPlan) -> FetchResult {
        let started = Instant::now();
        let timeout = Duration::from_millis(plan.timeout_ms);

        let checkout = match self.pool.checkout().await {
            Ok(c) => c,
            Err(e) => return fetcher_error(&ctx.url, started, ErrorKind::FetcherInternal, &e),
        };

        let nav_result = tokio::time::timeout(
            timeout,
            nav::goto_and_wait(checkout.page(), &ctx.url, &plan.wait_until, timeout),
        )
        .await;

        let nav_result = match nav_result {
            Ok(inner) => inner,
            Err(_) => {
                checkout.finish(true).await;
                return fetcher_error(&ctx.url, started, ErrorKind::NetworkTimeout, "navigation timed out");
            }
        };

        if let Err(e) = nav_result {
            checkout.finish(true).await;
            return fetcher_error(&ctx.url, started, ErrorKind::FetcherInternal, &e);
        }

        if plan.scroll_to_bottom {
            let remaining = timeout.saturating_sub(started.elapsed());
            let _ = nav::scroll_to_bottom(checkout.page(), remaining / 2).await;
        }

        let html = match nav::outer_html(checkout.page()).await {
            Ok(h) => h,
            Err(e) => {
                let screenshot = checkout.page().screenshot(Default::default()).await.ok();
                checkout.finish(true).await;
                return FetchResult {
                    final_url: ctx.url.clone(),
                    status_code: 0,
                    content_bytes: Vec::new(),
                    response_headers: Default::default(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    fetcher_used: "headless_browser".to_string(),
                    screenshot_bytes: screenshot,
                    truncated: false,
                    error: Some((ErrorKind::FetcherInternal, e)),
                };
            }
        };

        let final_url = checkout
            .page()
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| ctx.url.clone());

        checkout.finish(false).await;

        let (content_bytes, truncated) = truncate_body(html.into_bytes(), self.max_body_bytes);
        FetchResult {
            final_url,
            status_code: 200,
            content_bytes,
            response_headers: Default::default(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            fetcher_used: "headless_browser".to_string(),
            screenshot_bytes: None,
            truncated,
            error: None,
        }
    }
}

fn fetcher_error(url: &str, started: Instant, kind: ErrorKind, detail: &str) -> FetchResult {
    FetchResult {
        final_url: url.to_string(),
        status_code: 0,
        content_bytes: Vec::new(),
        response_headers: Default::default(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        fetcher_used: "headless_browser".to_string(),
        screenshot_bytes: None,
        truncated: false,
        error: Some((kind, detail.to_string())),
    }
}
