//! Per-request fetch entities: [`FetchContext`] goes in, [`FetchPlan`] is the
//! routing decision, [`FetchResult`] comes back out of a fetcher plugin.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Input to the Routing Engine and to the fetcher plugins themselves.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub url: String,
    pub effective_host: String,
    pub user_headers: HashMap<String, String>,
    pub user_timeout_ms: Option<u64>,
    pub prior_error_kind: Option<ErrorKind>,
    pub attempt_index: u32,
}

impl FetchContext {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let effective_host = effective_host(&url);
        Self {
            url,
            effective_host,
            user_headers: HashMap::new(),
            user_timeout_ms: None,
            prior_error_kind: None,
            attempt_index: 0,
        }
    }

    /// Build the context for the next attempt after a classified failure.
    pub fn escalate(&self, kind: ErrorKind) -> Self {
        Self {
            url: self.url.clone(),
            effective_host: self.effective_host.clone(),
            user_headers: self.user_headers.clone(),
            user_timeout_ms: self.user_timeout_ms,
            prior_error_kind: Some(kind),
            attempt_index: self.attempt_index + 1,
        }
    }
}

/// Compute the effective host for routing/template matching: lowercase,
/// strip a leading `www.`. Falls back to the raw URL string if it does not
/// parse (routing still needs *something* to match against).
pub fn effective_host(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            host.strip_prefix("www.").unwrap_or(&host).to_string()
        }
        Err(_) => url.to_lowercase(),
    }
}

/// Wait condition a `headless_browser` (or `browser_attach`) fetcher honors
/// before it is allowed to snapshot the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    DomLoaded,
    NetworkIdle,
    SelectorVisible(String),
    CustomDelayMs(u64),
}

impl WaitUntil {
    /// Parse the compact wire form used in routing YAML:
    /// `dom_loaded`, `network_idle`, `selector_visible:<css>`, `custom_delay_ms:<n>`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw == "dom_loaded" {
            return Ok(WaitUntil::DomLoaded);
        }
        if raw == "network_idle" {
            return Ok(WaitUntil::NetworkIdle);
        }
        if let Some(css) = raw.strip_prefix("selector_visible:") {
            if css.is_empty() {
                return Err("selector_visible: requires a non-empty CSS selector".to_string());
            }
            return Ok(WaitUntil::SelectorVisible(css.to_string()));
        }
        if let Some(ms) = raw.strip_prefix("custom_delay_ms:") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| format!("custom_delay_ms: expects an integer, got {ms:?}"))?;
            return Ok(WaitUntil::CustomDelayMs(ms));
        }
        Err(format!("unrecognized wait_until value: {raw:?}"))
    }
}

impl std::fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitUntil::DomLoaded => write!(f, "dom_loaded"),
            WaitUntil::NetworkIdle => write!(f, "network_idle"),
            WaitUntil::SelectorVisible(css) => write!(f, "selector_visible:{css}"),
            WaitUntil::CustomDelayMs(ms) => write!(f, "custom_delay_ms:{ms}"),
        }
    }
}

/// A routing decision: which fetcher to run, with what parameters, and how
/// to escalate if it fails.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub fetcher_id: String,
    pub timeout_ms: u64,
    pub request_headers: HashMap<String, String>,
    pub wait_until: WaitUntil,
    pub scroll_to_bottom: bool,
    pub max_attempts: u32,
    pub on_error_escalate_to: Option<String>,
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self {
            fetcher_id: "static_http".to_string(),
            timeout_ms: 30_000,
            request_headers: HashMap::new(),
            wait_until: WaitUntil::DomLoaded,
            scroll_to_bottom: false,
            max_attempts: 1,
            on_error_escalate_to: None,
        }
    }
}

/// Outcome of one fetch attempt.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub final_url: String,
    pub status_code: u16,
    pub content_bytes: Vec<u8>,
    pub response_headers: HashMap<String, String>,
    pub elapsed_ms: u64,
    pub fetcher_used: String,
    pub screenshot_bytes: Option<Vec<u8>>,
    pub truncated: bool,
    pub error: Option<(ErrorKind, String)>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.content_bytes.is_empty()
    }
}
