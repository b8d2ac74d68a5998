//! # WebDistill Routing
//!
//! The Fetch Routing & Fallback Engine (spec §4.3): a declarative YAML
//! ruleset mapping `(URL, domain, content-type, prior-error)` to a
//! [`webdistill_types::FetchPlan`], with a bounded decision cache and
//! atomic hot reload.
//!
//! ## Organization
//!
//! - `rule`: `RoutingRule`, `Conditions`, `Action` and their YAML shape.
//! - `snapshot`: the immutable, atomically-swappable `RoutingSnapshot`.
//! - `cache`: the bounded LRU decision cache.
//! - `classifier`: the Error Classifier (§4.1), a pure function.
//! - `engine`: the `RoutingEngine` that ties rule matching + cache together.
//! - `store`: the YAML loader with validation and file-watch hot reload.

pub mod cache;
pub mod classifier;
pub mod engine;
pub mod rule;
pub mod snapshot;
pub mod store;

pub use classifier::{classify, classify_http_response, ClassifierInput};
pub use engine::RoutingEngine;
pub use rule::{Action, Conditions, RoutingRule};
pub use snapshot::RoutingSnapshot;
pub use store::RoutingStore;
