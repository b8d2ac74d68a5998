//! `Template` and its YAML shape (spec §6 "Template YAML").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::transform::Transform;

/// Sentinel domain addressing the generic, catch-all template.
pub const GENERIC_DOMAIN: &str = "*";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub version: String,
    pub domains: Vec<String>,
    #[serde(default)]
    pub priority: i64,
    pub selectors: Selectors,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Template {
    pub fn is_generic(&self) -> bool {
        self.domains.iter().any(|d| d == GENERIC_DOMAIN)
    }

    /// Longest configured domain glob, used as the specificity tiebreak
    /// (spec §4.5: "ties broken by longest-specific domain (more dots
    /// first)").
    pub fn specificity(&self) -> usize {
        self.domains
            .iter()
            .map(|d| d.matches('.').count())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selectors {
    pub title: Option<SelectorSpec>,
    pub author: Option<SelectorSpec>,
    pub date: Option<SelectorSpec>,
    pub content: Option<SelectorSpec>,
    pub images: Option<SelectorSpec>,
    pub categories: Option<SelectorSpec>,
    pub tags: Option<SelectorSpec>,
    pub cover_image: Option<SelectorSpec>,
    /// Arbitrary `raw_metadata.<key>` entries not covered by the named
    /// fields above.
    #[serde(flatten)]
    pub raw_metadata: HashMap<String, SelectorSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default)]
    pub remove_selectors: Vec<String>,
    #[serde(default)]
    pub css_classes_to_remove: Vec<String>,
    #[serde(default)]
    pub ids_to_remove: Vec<String>,
    #[serde(default)]
    pub remove_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_max_heading_level")]
    pub max_heading_level: u8,
    #[serde(default)]
    pub include_toc: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_heading_level: default_max_heading_level(),
            include_toc: false,
        }
    }
}

fn default_max_heading_level() -> u8 {
    6
}

/// A `<selector-spec>`: a bare CSS string, a list of rules tried in order,
/// or a single fully-specified rule. Normalizes on deserialize to
/// `Vec<SelectorRule>` so callers always deal with one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    Css(String),
    Rule(SelectorRule),
    List(Vec<SelectorSpec>),
}

impl SelectorSpec {
    /// Flatten into an ordered list of rules to try, innermost lists
    /// expanded depth-first.
    pub fn rules(&self) -> Vec<SelectorRule> {
        match self {
            SelectorSpec::Css(s) => vec![SelectorRule::css_default(s.clone())],
            SelectorSpec::Rule(r) => vec![r.clone()],
            SelectorSpec::List(items) => items.iter().flat_map(|i| i.rules()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Css,
    Xpath,
    Regex,
    JsonLd,
    Meta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorRule {
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    pub selector: String,
    pub attribute: Option<String>,
    #[serde(default)]
    pub transform: Vec<Transform>,
    pub default: Option<String>,
    #[serde(default)]
    pub first_match_only: bool,
}

fn default_strategy() -> Strategy {
    Strategy::Css
}

impl SelectorRule {
    pub fn css_default(selector: String) -> Self {
        Self {
            strategy: Strategy::Css,
            selector,
            attribute: None,
            transform: Vec::new(),
            default: None,
            first_match_only: false,
        }
    }
}
