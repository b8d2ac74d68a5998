//! The immutable, atomically-swappable `RoutingSnapshot` (spec §3).

use std::sync::Arc;

use webdistill_types::FetchPlan;

use crate::cache::DecisionCache;
use crate::rule::{Action, Conditions, RoutingRule};

/// A single compiled rule, ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub priority: i64,
    pub insertion_order: usize,
    pub conditions: Conditions,
    pub action: Action,
}

/// An immutable, ordered list of enabled rules plus the process default
/// plan used when nothing matches (impossible once a catch-all rule is
/// present, but kept as a documented fallback).
///
/// Built atomically on load; holders of an `Arc<RoutingSnapshot>` keep
/// serving in-flight requests against it even after a newer snapshot is
/// published — there is no in-place mutation.
#[derive(Debug)]
pub struct RoutingSnapshot {
    /// Rules sorted by descending priority, ties broken by original
    /// insertion order (ascending) as the spec requires.
    pub rules: Vec<CompiledRule>,
    pub default_plan: FetchPlan,
    pub cache: DecisionCache,
    /// Monotonically increasing generation number, bumped on every
    /// successful reload; used only for observability/tests.
    pub generation: u64,
}

impl RoutingSnapshot {
    pub fn new(mut rules: Vec<CompiledRule>, default_plan: FetchPlan, generation: u64) -> Arc<Self> {
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.insertion_order.cmp(&b.insertion_order))
        });
        Arc::new(Self {
            rules,
            default_plan,
            cache: DecisionCache::new(1024),
            generation,
        })
    }

    pub fn from_raw_rules(rules: Vec<RoutingRule>, generation: u64) -> Result<Arc<Self>, String> {
        let compiled = crate::store::compile_rules(&rules)?;
        Ok(Self::new(compiled, FetchPlan::default(), generation))
    }
}
