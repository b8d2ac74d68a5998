//! The `static_http` fetcher (spec §4.4.1): a reqwest-backed plugin with
//! connection reuse, redirect-loop detection, and a per-host circuit
//! breaker. Decoding itself is delegated to [`crate::encoding`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::redirect::Policy;
use webdistill_types::{ErrorKind, FetchContext, FetchPlan, FetchResult};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::fetcher::{truncate_body, Fetcher};

const MAX_REDIRECTS: usize = 10;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct StaticHttpFetcher {
    client: reqwest::Client,
    accept_language: String,
    max_body_bytes: usize,
    breakers: DashMap<String, CircuitBreaker>,
}

impl StaticHttpFetcher {
    pub fn new(user_agent: impl Into<String>, accept_language: impl Into<String>) -> Result<Self, String> {
        Self::with_max_body_bytes(user_agent, accept_language, DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_max_body_bytes(
        user_agent: impl Into<String>,
        accept_language: impl Into<String>,
        max_body_bytes: usize,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.into())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .cookie_store(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            accept_language: accept_language.into(),
            max_body_bytes,
            breakers: DashMap::new(),
        })
    }

    fn breaker_for(&self, host: &str) -> dashmap::mapref::one::Ref<'_, String, CircuitBreaker> {
        if !self.breakers.contains_key(host) {
            self.breakers
                .entry(host.to_string())
                .or_insert_with(|| CircuitBreaker::new(CircuitBreakerConfig::default()));
        }
        self.breakers.get(host).unwrap()
    }
}

#[async_trait]
impl Fetcher for StaticHttpFetcher {
    fn id(&self) -> &'static str {
        "static_http"
    }

    async fn fetch(&self, ctx: &FetchContext, plan: &FetchPlan) -> FetchResult {
        let started = Instant::now();
        let breaker = self.breaker_for(&ctx.effective_host);

        if !breaker.allow_request() {
            return fetcher_error(&ctx.url, started, ErrorKind::FetcherInternal, "circuit breaker open for host");
        }

        let mut request = self
            .client
            .get(&ctx.url)
            .timeout(Duration::from_millis(plan.timeout_ms))
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Accept-Language", &self.accept_language);

        for (k, v) in &plan.request_headers {
            request = request.header(k, v);
        }
        for (k, v) in &ctx.user_headers {
            request = request.header(k, v);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                breaker.record_failure();
                let kind = classify_transport_error(&e);
                return fetcher_error(&ctx.url, started, kind, &e.to_string());
            }
        };

        if response.url().as_str() != ctx.url && response_redirect_count(&response) > MAX_REDIRECTS {
            breaker.record_failure();
            return fetcher_error(&ctx.url, started, ErrorKind::RedirectLoop, "exceeded maximum redirect count");
        }

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let redirect_count = response_redirect_count(&response);
        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(value) = v.to_str() {
                response_headers.insert(k.to_string(), value.to_string());
            }
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                breaker.record_failure();
                return fetcher_error(&ctx.url, started, ErrorKind::NetworkTimeout, &e.to_string());
            }
        };

        if (500..600).contains(&status_code) {
            breaker.record_failure();
            return fetcher_error(&final_url, started, ErrorKind::Http5xx, &format!("HTTP {status_code}"));
        }
        if status_code == 404 {
            breaker.record_failure();
            return fetcher_error(&final_url, started, ErrorKind::NotFound404, "HTTP 404");
        }
        if matches!(status_code, 401 | 403 | 429) {
            breaker.record_failure();
            return fetcher_error(&final_url, started, ErrorKind::Http4xxBlock, &format!("HTTP {status_code}"));
        }

        let content_error = webdistill_routing::classify_http_response(
            status_code,
            &response_headers,
            redirect_count as u32,
            &body,
            &ctx.effective_host,
            has_article_or_main_tag(&body),
        );

        if let Some(kind) = content_error {
            breaker.record_failure();
            return fetcher_error(&final_url, started, kind, "content-based classifier flagged this response");
        }

        breaker.record_success();
        let (content_bytes, truncated) = truncate_body(body.to_vec(), self.max_body_bytes);
        FetchResult {
            final_url,
            status_code,
            content_bytes,
            response_headers,
            elapsed_ms: started.elapsed().as_millis() as u64,
            fetcher_used: self.id().to_string(),
            screenshot_bytes: None,
            truncated,
            error: None,
        }
    }
}

/// Cheap lowercase substring probe used only to feed the classifier's
/// JS-required heuristic; the real structural check happens once the
/// Extraction Engine parses the DOM.
fn has_article_or_main_tag(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body).to_lowercase();
    text.contains("<article") || text.contains("<main")
}

/// reqwest already follows redirects internally via `Policy::limited`, so a
/// redirect-loop beyond the limit surfaces as a transport error rather than
/// a distinguishable count on the final response. This best-effort count
/// reads the (non-standard, but commonly present) hop count some
/// middleboxes echo back; it's a secondary signal, not the primary
/// detection path (that's `classify_transport_error`).
fn response_redirect_count(response: &reqwest::Response) -> usize {
    response
        .headers()
        .get("x-redirect-count")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn classify_transport_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_redirect() {
        ErrorKind::RedirectLoop
    } else if err.is_timeout() {
        ErrorKind::NetworkTimeout
    } else if err.is_connect() {
        ErrorKind::ConnectionReset
    } else {
        ErrorKind::FetcherInternal
    }
}

fn fetcher_error(url: &str, started: Instant, kind: ErrorKind, detail: &str) -> FetchResult {
    FetchResult {
        final_url: url.to_string(),
        status_code: 0,
        content_bytes: Vec::new(),
        response_headers: HashMap::new(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        fetcher_used: "static_http".to_string(),
        screenshot_bytes: None,
        truncated: false,
        error: Some((kind, detail.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webdistill_types::FetchContext;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_fetch_returns_body_and_no_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let fetcher = StaticHttpFetcher::new("webdistill-test/1.0", "en-US").unwrap();
        let ctx = FetchContext::new(format!("{}/ok", server.uri()));
        let plan = FetchPlan::default();
        let result = fetcher.fetch(&ctx, &plan).await;

        assert!(result.is_success());
        assert_eq!(result.content_bytes, b"hello");
        assert_eq!(result.status_code, 200);
    }

    #[tokio::test]
    async fn classifies_404_as_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = StaticHttpFetcher::new("webdistill-test/1.0", "en-US").unwrap();
        let ctx = FetchContext::new(format!("{}/missing", server.uri()));
        let result = fetcher.fetch(&ctx, &FetchPlan::default()).await;

        assert_eq!(result.error.map(|(k, _)| k), Some(ErrorKind::NotFound404));
    }

    #[tokio::test]
    async fn classifies_captcha_body_even_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Please verify you are human"))
            .mount(&server)
            .await;

        let fetcher = StaticHttpFetcher::new("webdistill-test/1.0", "en-US").unwrap();
        let ctx = FetchContext::new(format!("{}/blocked", server.uri()));
        let result = fetcher.fetch(&ctx, &FetchPlan::default()).await;

        assert_eq!(result.error.map(|(k, _)| k), Some(ErrorKind::CaptchaDetected));
    }

    #[tokio::test]
    async fn classifies_5xx_as_http_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = StaticHttpFetcher::new("webdistill-test/1.0", "en-US").unwrap();
        let ctx = FetchContext::new(format!("{}/boom", server.uri()));
        let result = fetcher.fetch(&ctx, &FetchPlan::default()).await;

        assert_eq!(result.error.map(|(k, _)| k), Some(ErrorKind::Http5xx));
    }
}
