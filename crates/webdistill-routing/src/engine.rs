//! The Routing Engine (spec §4.3 "Decision"): consults the current
//! [`RoutingSnapshot`] to turn a [`FetchContext`] into a [`FetchPlan`],
//! consulting and populating the decision cache along the way.

use std::sync::Arc;

use webdistill_types::{ErrorKind, FetchContext, FetchPlan};

use crate::cache::DecisionKey;
use crate::snapshot::RoutingSnapshot;

/// Escalation chains longer than this are refused; the caller should treat
/// the last successful plan as final and surface `BUDGET_EXCEEDED` instead
/// of escalating further (spec §4.3 "escalation depth capped at 2").
pub const MAX_ESCALATION_DEPTH: u32 = 2;

/// Stateless façade over an `Arc<RoutingSnapshot>`. Cheap to construct per
/// request; the snapshot itself is what's shared and atomically swapped.
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    snapshot: Arc<RoutingSnapshot>,
}

impl RoutingEngine {
    pub fn new(snapshot: Arc<RoutingSnapshot>) -> Self {
        Self { snapshot }
    }

    /// Resolve a `FetchContext` into a `FetchPlan`.
    ///
    /// Matching walks the pre-sorted rule list (descending priority, ties
    /// broken by insertion order) and returns the first rule whose
    /// conditions all match. Content-type matching only applies on
    /// escalation attempts where a prior response's content-type is known;
    /// the initial attempt has none, so any `content_type` condition
    /// trivially fails to match on attempt 0 (by design: content-type
    /// conditions exist to catch mis-served content after a first fetch,
    /// not to gate the very first request).
    pub fn resolve(&self, ctx: &FetchContext, response_content_type: Option<&str>) -> FetchPlan {
        if ctx.attempt_index > MAX_ESCALATION_DEPTH {
            let mut plan = self.snapshot.default_plan.clone();
            plan.max_attempts = 1;
            plan.on_error_escalate_to = None;
            return plan;
        }

        let path = path_of(&ctx.url);
        let key = DecisionKey::new(&ctx.effective_host, &path, ctx.prior_error_kind);
        if let Some(cached) = self.snapshot.cache.get(&key) {
            return merge_user_overrides(cached, ctx);
        }

        let plan = self.match_rules(ctx, response_content_type);
        self.snapshot.cache.put(key, plan.clone());
        merge_user_overrides(plan, ctx)
    }

    fn match_rules(&self, ctx: &FetchContext, response_content_type: Option<&str>) -> FetchPlan {
        for rule in &self.snapshot.rules {
            if !rule.conditions.domain_matches(&ctx.effective_host) {
                continue;
            }
            if !rule.conditions.url_matches(&ctx.url) {
                continue;
            }
            if !rule.conditions.content_type_matches(response_content_type) {
                continue;
            }
            if !rule.conditions.error_kind_matches(ctx.prior_error_kind) {
                continue;
            }
            return FetchPlan {
                fetcher_id: rule.action.fetcher_id.clone(),
                timeout_ms: rule.action.timeout_ms,
                request_headers: rule.action.headers.clone(),
                wait_until: rule.action.wait_until.clone(),
                scroll_to_bottom: rule.action.scroll_to_bottom,
                max_attempts: rule.action.max_attempts,
                on_error_escalate_to: rule.action.on_error_escalate_to.clone(),
            };
        }
        self.snapshot.default_plan.clone()
    }

    /// Decide whether a classified failure should escalate, and to which
    /// fetcher, given the plan that just failed. Returns `None` when the
    /// error kind is not escalatable, the plan names no escalation target,
    /// or the escalation depth cap has been reached.
    pub fn escalation_target(&self, ctx: &FetchContext, plan: &FetchPlan, kind: ErrorKind) -> Option<String> {
        if !kind.is_escalatable() {
            return None;
        }
        if ctx.attempt_index + 1 > MAX_ESCALATION_DEPTH {
            return None;
        }
        plan.on_error_escalate_to.clone()
    }

    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.snapshot.clone()
    }
}

fn merge_user_overrides(mut plan: FetchPlan, ctx: &FetchContext) -> FetchPlan {
    if let Some(timeout_ms) = ctx.user_timeout_ms {
        plan.timeout_ms = timeout_ms;
    }
    for (k, v) in &ctx.user_headers {
        plan.request_headers.insert(k.clone(), v.clone());
    }
    plan
}

fn path_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut p = parsed.path().to_string();
            if let Some(q) = parsed.query() {
                p.push('?');
                p.push_str(q);
            }
            p
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Action, Conditions, KNOWN_FETCHERS};
    use crate::snapshot::CompiledRule;
    use webdistill_types::WaitUntil;

    fn action(fetcher: &str) -> Action {
        Action {
            fetcher_id: fetcher.to_string(),
            timeout_ms: 30_000,
            headers: Default::default(),
            wait_until: WaitUntil::DomLoaded,
            scroll_to_bottom: false,
            on_error_escalate_to: None,
            max_attempts: 1,
        }
    }

    fn empty_conditions() -> Conditions {
        Conditions {
            domain: None,
            url_regex: None,
            content_type: None,
            error_kind: None,
        }
    }

    fn domain_rule(name: &str, priority: i64, order: usize, domain: &str, fetcher: &str) -> CompiledRule {
        CompiledRule {
            name: name.to_string(),
            priority,
            insertion_order: order,
            conditions: Conditions {
                domain: Some(domain.to_string()),
                ..empty_conditions()
            },
            action: action(fetcher),
        }
    }

    fn catch_all() -> CompiledRule {
        CompiledRule {
            name: "catch_all".to_string(),
            priority: 0,
            insertion_order: 99,
            conditions: empty_conditions(),
            action: action(KNOWN_FETCHERS[0]),
        }
    }

    #[test]
    fn falls_back_to_default_when_nothing_matches() {
        let snapshot = RoutingSnapshot::new(vec![catch_all()], FetchPlan::default(), 0);
        let engine = RoutingEngine::new(snapshot);
        let ctx = FetchContext::new("https://unmatched.test/x");
        let plan = engine.resolve(&ctx, None);
        assert_eq!(plan.fetcher_id, "static_http");
    }

    #[test]
    fn domain_specific_rule_takes_priority_over_catch_all() {
        let rules = vec![
            catch_all(),
            domain_rule("js_domain", 10, 0, "example.com", "headless_browser"),
        ];
        let snapshot = RoutingSnapshot::new(rules, FetchPlan::default(), 0);
        let engine = RoutingEngine::new(snapshot);
        let ctx = FetchContext::new("https://example.com/article");
        let plan = engine.resolve(&ctx, None);
        assert_eq!(plan.fetcher_id, "headless_browser");
    }

    #[test]
    fn escalation_depth_cap_forces_default_plan() {
        let snapshot = RoutingSnapshot::new(vec![catch_all()], FetchPlan::default(), 0);
        let engine = RoutingEngine::new(snapshot);
        let mut ctx = FetchContext::new("https://example.com/x");
        ctx.attempt_index = MAX_ESCALATION_DEPTH + 1;
        let plan = engine.resolve(&ctx, None);
        assert_eq!(plan.max_attempts, 1);
        assert!(plan.on_error_escalate_to.is_none());
    }

    #[test]
    fn escalation_target_respects_escalatable_kinds() {
        let snapshot = RoutingSnapshot::new(vec![catch_all()], FetchPlan::default(), 0);
        let engine = RoutingEngine::new(snapshot);
        let ctx = FetchContext::new("https://example.com/x");
        let mut plan = FetchPlan::default();
        plan.on_error_escalate_to = Some("headless_browser".to_string());

        assert_eq!(
            engine.escalation_target(&ctx, &plan, ErrorKind::NetworkTimeout),
            Some("headless_browser".to_string())
        );
        assert_eq!(engine.escalation_target(&ctx, &plan, ErrorKind::RedirectLoop), None);
    }

    #[test]
    fn user_header_and_timeout_overrides_apply_after_cache() {
        let snapshot = RoutingSnapshot::new(vec![catch_all()], FetchPlan::default(), 0);
        let engine = RoutingEngine::new(snapshot);
        let mut ctx = FetchContext::new("https://example.com/x");
        ctx.user_timeout_ms = Some(5_000);
        ctx.user_headers.insert("X-Test".to_string(), "1".to_string());

        let plan = engine.resolve(&ctx, None);
        assert_eq!(plan.timeout_ms, 5_000);
        assert_eq!(plan.request_headers.get("X-Test").map(String::as_str), Some("1"));
    }
}
