//! YAML loader, validator, and hot-reload watcher for routing rules
//! (spec §4.3 "Loader & validation" / "Hot reload").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use webdistill_types::{ErrorKind, FetchPlan, WaitUntil};

use crate::rule::{Action, CompiledRule, Conditions, RawAction, RawConditions, RoutingRule, KNOWN_FETCHERS};
use crate::snapshot::RoutingSnapshot;

/// Top-level routing YAML document shape (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDocument {
    pub version: i64,
    #[serde(default)]
    pub defaults: RawAction,
    pub rules: Vec<RoutingRule>,
}

/// Read a routing YAML document from disk and parse it. Does not validate
/// or compile; see [`RoutingStore::load`] for the full pipeline.
pub fn parse_document(yaml: &str) -> Result<RoutingDocument, String> {
    serde_yaml::from_str(yaml).map_err(|e| format!("routing YAML parse error: {e}"))
}

/// Validate + compile rules against the document's `defaults`. Returns one
/// `CompiledRule` per enabled rule (disabled rules are dropped — they can
/// never match, so there is no reason to carry them into the snapshot).
///
/// Validation errors abort the whole load (spec: "aborts the load without
/// replacing the current snapshot").
pub fn compile_rules(rules: &[RoutingRule]) -> Result<Vec<CompiledRule>, String> {
    if rules.is_empty() {
        return Err("rule set must be non-empty".to_string());
    }

    let has_catch_all = rules
        .iter()
        .any(|r| r.enabled && r.priority == 0 && !r.conditions.has_conditions());
    if !has_catch_all {
        return Err("rule set must contain a default catch-all rule at priority 0 (no conditions)".to_string());
    }

    let mut compiled = Vec::with_capacity(rules.len());
    for (idx, rule) in rules.iter().enumerate() {
        if !rule.enabled {
            continue;
        }
        if rule.priority < 0 {
            return Err(format!("rule {:?}: priority must be >= 0", rule.name));
        }
        let is_catch_all = rule.priority == 0 && !rule.conditions.has_conditions();
        if !is_catch_all && !rule.conditions.has_conditions() {
            return Err(format!(
                "rule {:?}: must specify at least one condition (only the priority-0 catch-all may omit conditions)",
                rule.name
            ));
        }

        let conditions = compile_conditions(&rule.conditions)
            .map_err(|e| format!("rule {:?}: {e}", rule.name))?;
        let action = compile_action(&rule.action)
            .map_err(|e| format!("rule {:?}: {e}", rule.name))?;

        compiled.push(CompiledRule {
            name: rule.name.clone(),
            priority: rule.priority,
            insertion_order: idx,
            conditions,
            action,
        });
    }
    Ok(compiled)
}

impl RawConditions {
    fn has_conditions(&self) -> bool {
        self.domain.is_some()
            || self.url_regex.is_some()
            || self.content_type.is_some()
            || self.error_kind.is_some()
    }
}

fn compile_conditions(raw: &RawConditions) -> Result<Conditions, String> {
    let url_regex = match &raw.url_regex {
        Some(pattern) => Some(Regex::new(pattern).map_err(|e| format!("invalid url_regex: {e}"))?),
        None => None,
    };
    let content_type = match &raw.content_type {
        Some(pattern) => {
            Some(Regex::new(pattern).map_err(|e| format!("invalid content_type regex: {e}"))?)
        }
        None => None,
    };
    let error_kind = match &raw.error_kind {
        Some(s) => Some(
            s.parse::<ErrorKind>()
                .map_err(|e| format!("invalid error_kind: {e}"))?,
        ),
        None => None,
    };
    Ok(Conditions {
        domain: raw.domain.clone(),
        url_regex,
        content_type,
        error_kind,
    })
}

fn compile_action(raw: &RawAction) -> Result<Action, String> {
    let fetcher_id = raw
        .fetcher
        .clone()
        .ok_or_else(|| "action.fetcher is required".to_string())?;
    if !KNOWN_FETCHERS.contains(&fetcher_id.as_str()) {
        return Err(format!(
            "unknown fetcher {fetcher_id:?}; expected one of {KNOWN_FETCHERS:?}"
        ));
    }
    if let Some(escalate_to) = &raw.on_error_escalate_to {
        if !KNOWN_FETCHERS.contains(&escalate_to.as_str()) {
            return Err(format!(
                "unknown on_error_escalate_to fetcher {escalate_to:?}"
            ));
        }
    }
    let wait_until = match &raw.wait_until {
        Some(s) => WaitUntil::parse(s)?,
        None => WaitUntil::DomLoaded,
    };
    Ok(Action {
        fetcher_id,
        timeout_ms: raw.timeout_ms.unwrap_or(30_000),
        headers: raw.headers.clone(),
        wait_until,
        scroll_to_bottom: raw.scroll_to_bottom.unwrap_or(false),
        on_error_escalate_to: raw.on_error_escalate_to.clone(),
        max_attempts: raw.max_attempts.unwrap_or(1),
    })
}

/// Merge a rule's action fields with the document's `defaults` block.
/// Absent per-rule fields inherit from `defaults` (spec §6).
fn merge_defaults(defaults: &RawAction, action: &RawAction) -> RawAction {
    RawAction {
        fetcher: action.fetcher.clone().or_else(|| defaults.fetcher.clone()),
        timeout_ms: action.timeout_ms.or(defaults.timeout_ms),
        headers: {
            let mut merged = defaults.headers.clone();
            merged.extend(action.headers.clone());
            merged
        },
        wait_until: action.wait_until.clone().or_else(|| defaults.wait_until.clone()),
        scroll_to_bottom: action.scroll_to_bottom.or(defaults.scroll_to_bottom),
        on_error_escalate_to: action
            .on_error_escalate_to
            .clone()
            .or_else(|| defaults.on_error_escalate_to.clone()),
        max_attempts: action.max_attempts.or(defaults.max_attempts),
    }
}

/// Parse, validate, and compile a routing document's rules, applying
/// `defaults` merge before compilation.
pub fn build_rules(doc: &RoutingDocument) -> Result<Vec<RoutingRule>, String> {
    Ok(doc
        .rules
        .iter()
        .map(|rule| RoutingRule {
            name: rule.name.clone(),
            priority: rule.priority,
            enabled: rule.enabled,
            conditions: rule.conditions.clone(),
            action: merge_defaults(&doc.defaults, &rule.action),
        })
        .collect())
}

/// Owns the currently-serving [`RoutingSnapshot`] and, if constructed with
/// [`RoutingStore::load_with_watch`], a background file watcher that
/// rebuilds it on change.
pub struct RoutingStore {
    path: PathBuf,
    snapshot: Arc<ArcSwap<RoutingSnapshot>>,
    generation: AtomicU64,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl RoutingStore {
    /// Load the routing document at `path`, validate it, and construct a
    /// store serving the resulting snapshot. Fails only if the *initial*
    /// load is invalid — there is no previous snapshot to fall back to
    /// yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let snapshot = load_snapshot(&path, 0)?;
        Ok(Self {
            path,
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot.as_ref().clone_shallow())),
            generation: AtomicU64::new(0),
            _watcher: None,
        })
    }

    pub fn current(&self) -> Arc<RoutingSnapshot> {
        self.snapshot.load_full()
    }

    /// Re-read and re-validate the routing file, atomically publishing a
    /// new snapshot on success. On validation failure, the previous
    /// snapshot keeps serving — this is the "abort the load" rule.
    pub fn reload(&self) -> Result<(), String> {
        let next_gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match load_snapshot(&self.path, next_gen) {
            Ok(new_snapshot) => {
                self.snapshot.store(Arc::new(new_snapshot.as_ref().clone_shallow()));
                tracing::info!(generation = next_gen, "routing snapshot reloaded");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "routing reload failed validation; keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Convenience constructor that loads the document and immediately
    /// starts watching it, returning a store that owns the watcher handle.
    pub fn load_with_watch(path: impl Into<PathBuf>) -> Result<Arc<Self>, String> {
        let path = path.into();
        let mut store = Self::load(path.clone())?;

        let snapshot_handle = store.snapshot.clone();
        let generation_start = store.generation.load(Ordering::SeqCst);
        let watch_path = path.clone();

        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event.kind.is_modify() || event.kind.is_create() {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| format!("failed to start routing file watcher: {e}"))?;

        use notify::{RecursiveMode, Watcher};
        watcher
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| format!("failed to watch {watch_path:?}: {e}"))?;

        let generation = Arc::new(AtomicU64::new(generation_start));
        let reload_path = watch_path.clone();
        std::thread::spawn(move || {
            for _ in rx {
                std::thread::sleep(Duration::from_millis(50));
                let next_gen = generation.fetch_add(1, Ordering::SeqCst) + 1;
                match load_snapshot(&reload_path, next_gen) {
                    Ok(new_snapshot) => {
                        snapshot_handle.store(Arc::new(new_snapshot.as_ref().clone_shallow()));
                        tracing::info!(generation = next_gen, "routing snapshot reloaded");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "routing reload failed validation; keeping previous snapshot");
                    }
                }
            }
        });

        store._watcher = Some(watcher);
        Ok(Arc::new(store))
    }
}

fn load_snapshot(path: &Path, generation: u64) -> Result<Arc<RoutingSnapshot>, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read routing file {path:?}: {e}"))?;
    let doc = parse_document(&contents)?;
    let rules = build_rules(&doc)?;
    let compiled = compile_rules(&rules)?;
    Ok(RoutingSnapshot::new(compiled, FetchPlan::default(), generation))
}

impl RoutingSnapshot {
    /// Shallow clone used only when re-homing a freshly-built snapshot into
    /// a fresh `ArcSwap` slot; `CompiledRule` and `FetchPlan` are cheap to
    /// clone and the cache is intentionally NOT carried over (a fresh
    /// snapshot always gets a fresh, empty decision cache).
    fn clone_shallow(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            default_plan: self.default_plan.clone(),
            cache: crate::cache::DecisionCache::new(1024),
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
version: 1
defaults:
  timeout_ms: 20000
  headers: {}
rules:
  - name: catch_all
    priority: 0
    enabled: true
    conditions: {}
    action:
      fetcher: static_http
"#;

    #[test]
    fn parses_and_compiles_minimal_document() {
        let doc = parse_document(MINIMAL_YAML).unwrap();
        let rules = build_rules(&doc).unwrap();
        let compiled = compile_rules(&rules).unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].action.timeout_ms, 20_000);
    }

    #[test]
    fn missing_catch_all_is_rejected() {
        let yaml = r#"
version: 1
rules:
  - name: only_rule
    priority: 5
    enabled: true
    conditions:
      domain: example.com
    action:
      fetcher: static_http
"#;
        let doc = parse_document(yaml).unwrap();
        let rules = build_rules(&doc).unwrap();
        assert!(compile_rules(&rules).is_err());
    }

    #[test]
    fn unknown_fetcher_is_rejected() {
        let yaml = r#"
version: 1
rules:
  - name: catch_all
    priority: 0
    enabled: true
    conditions: {}
    action:
      fetcher: smoke_signal
"#;
        let doc = parse_document(yaml).unwrap();
        let rules = build_rules(&doc).unwrap();
        assert!(compile_rules(&rules).is_err());
    }

    #[test]
    fn invalid_load_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.yaml");
        std::fs::write(&path, MINIMAL_YAML).unwrap();

        let store = RoutingStore::load(&path).unwrap();
        let before = store.current().generation;

        std::fs::write(&path, "not: [valid",).unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.current().generation, before);
    }

    #[test]
    fn valid_reload_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.yaml");
        std::fs::write(&path, MINIMAL_YAML).unwrap();

        let store = RoutingStore::load(&path).unwrap();
        let before = store.current().generation;

        std::fs::write(&path, MINIMAL_YAML).unwrap();
        store.reload().unwrap();
        assert_eq!(store.current().generation, before + 1);
    }
}
