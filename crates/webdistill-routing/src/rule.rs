//! `RoutingRule` and its YAML shape (spec §6 "Routing YAML").

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use webdistill_types::{ErrorKind, WaitUntil};

/// One rule as parsed from YAML, before compiled regexes are built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub conditions: RawConditions,
    pub action: RawAction,
}

fn default_true() -> bool {
    true
}

/// Raw (string-based) conditions as they appear in YAML, prior to
/// compiling `url_regex`/`content_type` into [`Regex`] objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConditions {
    pub domain: Option<String>,
    pub url_regex: Option<String>,
    pub content_type: Option<String>,
    pub error_kind: Option<String>,
}

/// Raw action as it appears in YAML, prior to defaults being merged in from
/// the ruleset's `defaults` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAction {
    pub fetcher: Option<String>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub wait_until: Option<String>,
    pub scroll_to_bottom: Option<bool>,
    pub on_error_escalate_to: Option<String>,
    pub max_attempts: Option<u32>,
}

/// Compiled, ready-to-match conditions. Conjunctive: every `Some` field
/// must match for the rule to apply.
#[derive(Debug, Clone)]
pub struct Conditions {
    pub domain: Option<String>,
    pub url_regex: Option<Regex>,
    pub content_type: Option<Regex>,
    pub error_kind: Option<ErrorKind>,
}

impl Conditions {
    pub fn has_any(&self) -> bool {
        self.domain.is_some()
            || self.url_regex.is_some()
            || self.content_type.is_some()
            || self.error_kind.is_some()
    }

    /// Domain glob match: exact match, or `*.example.com` matching the
    /// bare apex (`example.com`) as well as any subdomain.
    pub fn domain_matches(&self, effective_host: &str) -> bool {
        match &self.domain {
            None => true,
            Some(glob) => domain_glob_matches(glob, effective_host),
        }
    }

    pub fn url_matches(&self, url: &str) -> bool {
        match &self.url_regex {
            None => true,
            Some(re) => re.is_match(url),
        }
    }

    pub fn content_type_matches(&self, content_type: Option<&str>) -> bool {
        match &self.content_type {
            None => true,
            Some(re) => content_type.map(|ct| re.is_match(ct)).unwrap_or(false),
        }
    }

    pub fn error_kind_matches(&self, prior: Option<ErrorKind>) -> bool {
        match self.error_kind {
            None => true,
            Some(expected) => prior == Some(expected),
        }
    }
}

/// Glob matcher supporting only the forms the spec requires: an exact
/// hostname, or `*.suffix` matching any strict subdomain of `suffix`.
pub fn domain_glob_matches(glob: &str, effective_host: &str) -> bool {
    if glob == "*" {
        return true;
    }
    match glob.strip_prefix("*.") {
        Some(suffix) => {
            effective_host == suffix || effective_host.ends_with(&format!(".{suffix}"))
        }
        None => effective_host == glob,
    }
}

/// Compiled, ready-to-execute action. All fields resolved against
/// `defaults` at load time, so matching never has to consult them again.
#[derive(Debug, Clone)]
pub struct Action {
    pub fetcher_id: String,
    pub timeout_ms: u64,
    pub headers: HashMap<String, String>,
    pub wait_until: WaitUntil,
    pub scroll_to_bottom: bool,
    pub on_error_escalate_to: Option<String>,
    pub max_attempts: u32,
}

/// Known fetcher identifiers, validated at load time.
pub const KNOWN_FETCHERS: &[&str] = &["static_http", "headless_browser", "browser_attach"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_exact_and_subdomains() {
        assert!(domain_glob_matches("example.com", "example.com"));
        assert!(!domain_glob_matches("example.com", "api.example.com"));
        assert!(domain_glob_matches("*.example.com", "api.example.com"));
        assert!(domain_glob_matches("*.example.com", "example.com"));
        assert!(!domain_glob_matches("*.example.com", "notexample.com"));
        assert!(domain_glob_matches("*", "anything.test"));
    }
}
