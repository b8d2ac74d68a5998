//! The `browser_attach` fetcher (spec §4.4.3): connects to an
//! already-running browser's debug endpoint instead of launching one.
//! Used for sites that need a human-logged-in session prepared out of
//! band by an external collaborator.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Browser;
use webdistill_fetch::{truncate_body, Fetcher};
use webdistill_types::{ErrorKind, FetchContext, FetchPlan, FetchResult};

use crate::nav;

const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct BrowserAttachFetcher {
    endpoint: String,
    max_body_bytes: usize,
}

impl BrowserAttachFetcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_max_body_bytes(endpoint, DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_max_body_bytes(endpoint: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_body_bytes,
        }
    }
}

#[async_trait]
impl Fetcher for BrowserAttachFetcher {
    fn id(&self) -> &'static str {
        "browser_attach"
    }

    async fn fetch(&self, ctx: &FetchContext, plan: &FetchPlan) -> FetchResult {
        let started = Instant::now();
        let timeout = Duration::from_millis(plan.timeout_ms);

        let (browser, mut handler) = match Browser::connect(&self.endpoint).await {
            Ok(pair) => pair,
            Err(e) => {
                return fetcher_error(
                    &ctx.url,
                    started,
                    ErrorKind::FetcherInternal,
                    &format!("browser_attach endpoint {} unreachable: {e}", self.endpoint),
                );
            }
        };
        tokio::spawn(async move {
            use futures_util::StreamExt;
            while handler.next().await.is_some() {}
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                return fetcher_error(&ctx.url, started, ErrorKind::FetcherInternal, &format!("failed to open page: {e}"));
            }
        };

        let nav_result = tokio::time::timeout(
            timeout,
            nav::goto_and_wait(&page, &ctx.url, &plan.wait_until, timeout),
        )
        .await;

        let nav_result = match nav_result {
            Ok(inner) => inner,
            Err(_) => return fetcher_error(&ctx.url, started, ErrorKind::NetworkTimeout, "navigation timed out"),
        };
        if let Err(e) = nav_result {
            return fetcher_error(&ctx.url, started, ErrorKind::FetcherInternal, &e);
        }

        if plan.scroll_to_bottom {
            let remaining = timeout.saturating_sub(started.elapsed());
            let _ = nav::scroll_to_bottom(&page, remaining / 2).await;
        }

        let html = match nav::outer_html(&page).await {
            Ok(h) => h,
            Err(e) => return fetcher_error(&ctx.url, started, ErrorKind::FetcherInternal, &e),
        };
        let final_url = page.url().await.ok().flatten().unwrap_or_else(|| ctx.url.clone());

        let (content_bytes, truncated) = truncate_body(html.into_bytes(), self.max_body_bytes);
        FetchResult {
            final_url,
            status_code: 200,
            content_bytes,
            response_headers: Default::default(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            fetcher_used: "browser_attach".to_string(),
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
        fetcher_used: "browser_attach".to_string(),
        screenshot_bytes: None,
        truncated: false,
        error: Some((kind, detail.to_string())),
    }
}
