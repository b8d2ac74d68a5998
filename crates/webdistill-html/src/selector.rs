//! Field extraction (spec §4.6 "Field extraction" / "Selector strategies"
//! / "Attribute extraction").

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::template::{SelectorRule, Strategy};
use crate::transform::{apply_pipeline, TransformOutcome};
use crate::xpath;

/// Result of running one field's full rule list: the final transformed
/// value (or the rule's `default` if nothing matched) plus any flags raised
/// along the way (e.g. `date_parse_failed`).
#[derive(Debug, Clone, Default)]
pub struct FieldOutcome {
    pub value: Option<String>,
    pub flags: Vec<(String, String)>,
}

fn raw_values_for_rule(document: &Html, raw_html: &str, rule: &SelectorRule, base_url: &str) -> Vec<String> {
    match rule.strategy {
        Strategy::Css => extract_css(document, rule, base_url),
        Strategy::Xpath => extract_xpath(document, rule),
        Strategy::Regex => extract_regex(raw_html, rule),
        Strategy::JsonLd => extract_json_ld(document, rule),
        Strategy::Meta => extract_meta(document, rule),
    }
}

/// Evaluate a field's ordered rule list against `document`, trying each
/// rule until one produces a non-empty value.
pub fn extract_field(document: &Html, raw_html: &str, rules: &[SelectorRule], base_url: &str) -> FieldOutcome {
    for rule in rules {
        let raw_values = raw_values_for_rule(document, raw_html, rule, base_url);
        if raw_values.is_empty() {
            continue;
        }

        let joined = join_values(&raw_values, block_level_join(rule));
        let TransformOutcome { value, flags } = apply_pipeline(&joined, &rule.transform, base_url);
        if !value.trim().is_empty() {
            return FieldOutcome {
                value: Some(value),
                flags,
            };
        }
    }

    let default = rules.iter().find_map(|r| r.default.clone());
    FieldOutcome {
        value: default,
        flags: Vec::new(),
    }
}

/// Evaluate a field's ordered rule list, returning every matched value of
/// the first rule that matches anything — each transformed independently
/// (no join). Used for naturally-plural fields (`categories`, `tags`),
/// where each selector match is its own list item rather than a fragment to
/// concatenate.
pub fn extract_list(document: &Html, raw_html: &str, rules: &[SelectorRule], base_url: &str) -> Vec<String> {
    for rule in rules {
        let raw_values = raw_values_for_rule(document, raw_html, rule, base_url);
        if raw_values.is_empty() {
            continue;
        }
        return raw_values
            .into_iter()
            .map(|raw| apply_pipeline(&raw, &rule.transform, base_url).value)
            .filter(|v| !v.trim().is_empty())
            .collect();
    }
    Vec::new()
}

/// Concatenation rule per spec: `\n\n` between block-level matches, single
/// space for inline. We treat a rule as "block-level" unless its selector
/// clearly targets inline elements, using a small denylist of common inline
/// tag names.
fn block_level_join(rule: &SelectorRule) -> bool {
    const INLINE_TAGS: &[&str] = &["a", "span", "strong", "em", "b", "i", "code"];
    !INLINE_TAGS.iter().any(|t| rule.selector.trim_start().starts_with(t))
}

fn join_values(values: &[String], block_level: bool) -> String {
    let sep = if block_level { "\n\n" } else { " " };
    values.join(sep)
}

fn extract_css(document: &Html, rule: &SelectorRule, base_url: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(&rule.selector) else {
        tracing::warn!(selector = rule.selector, "invalid CSS selector, skipping rule");
        return Vec::new();
    };
    let matches: Vec<ElementRef> = document.select(&selector).collect();
    let matches = if rule.first_match_only {
        matches.into_iter().take(1).collect()
    } else {
        matches
    };

    matches
        .iter()
        .filter_map(|el| extract_from_element(el, rule, base_url))
        .collect()
}

fn extract_from_element(el: &ElementRef, rule: &SelectorRule, base_url: &str) -> Option<String> {
    match &rule.attribute {
        Some(attr) => {
            let attr_name = attr.strip_prefix('@').unwrap_or(attr);
            let raw = el.value().attr(attr_name)?;
            if matches!(attr_name, "href" | "src") {
                crate::transform::absolutize(raw, base_url).or_else(|| Some(raw.to_string()))
            } else {
                Some(raw.to_string())
            }
        }
        None => {
            let text = collapse_text(el.text().collect::<Vec<_>>().join(" "));
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
    }
}

fn collapse_text(raw: String) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn extract_xpath(document: &Html, rule: &SelectorRule) -> Vec<String> {
    match xpath::evaluate(&rule.selector, document.root_element()) {
        Ok(values) => values.into_iter().map(|v| collapse_text(v)).filter(|v| !v.is_empty()).collect(),
        Err(e) => {
            tracing::warn!(selector = rule.selector, error = %e, "xpath evaluation failed, skipping rule");
            Vec::new()
        }
    }
}

fn extract_regex(raw_html: &str, rule: &SelectorRule) -> Vec<String> {
    let Ok(re) = Regex::new(&rule.selector) else {
        tracing::warn!(selector = rule.selector, "invalid regex selector, skipping rule");
        return Vec::new();
    };
    if let Some(caps) = re.captures(raw_html) {
        let value = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str().to_string());
        value.into_iter().collect()
    } else {
        Vec::new()
    }
}

static LD_JSON_SELECTOR: &str = "script[type='application/ld+json']";

fn extract_json_ld(document: &Html, rule: &SelectorRule) -> Vec<String> {
    let Ok(selector) = Selector::parse(LD_JSON_SELECTOR) else {
        return Vec::new();
    };
    let mut merged = serde_json::Map::new();
    for el in document.select(&selector) {
        let text: String = el.text().collect();
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            merge_json_object(&mut merged, value);
        }
    }
    let merged_value = Value::Object(merged);
    json_path_lookup(&merged_value, &rule.selector)
        .map(|v| vec![v])
        .unwrap_or_default()
}

fn merge_json_object(into: &mut serde_json::Map<String, Value>, value: Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                into.entry(k).or_insert(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                merge_json_object(into, item);
            }
        }
        _ => {}
    }
}

/// Evaluate a minimal JSONPath-like expression: `$.article.headline`,
/// `$.datePublished`. Only dotted field access is supported, matching the
/// two example forms in the spec.
fn json_path_lookup(value: &Value, path: &str) -> Option<String> {
    let path = path.strip_prefix('$').unwrap_or(path);
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Resolve the content container: the first rule (css or xpath only — the
/// other strategies have no element-level meaning) that matches at least
/// one element. Per spec §4.6 "the `content` selector yields a container
/// node (or ordered list of candidate containers)", the first candidate
/// with a match wins.
pub fn resolve_container<'a>(document: &'a Html, rules: &[SelectorRule]) -> Option<ElementRef<'a>> {
    for rule in rules {
        match rule.strategy {
            Strategy::Css => {
                let Ok(selector) = Selector::parse(&rule.selector) else {
                    continue;
                };
                if let Some(el) = document.select(&selector).next() {
                    return Some(el);
                }
            }
            Strategy::Xpath => {
                if let Some(el) = xpath::evaluate_element(&rule.selector, document.root_element()) {
                    return Some(el);
                }
            }
            _ => continue,
        }
    }
    None
}

fn extract_meta(document: &Html, rule: &SelectorRule) -> Vec<String> {
    let selector_str = format!(
        "meta[name='{name}' i], meta[property='{name}' i]",
        name = rule.selector
    );
    let Ok(selector) = Selector::parse(&selector_str) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::SelectorRule;

    fn rule(selector: &str) -> SelectorRule {
        SelectorRule::css_default(selector.to_string())
    }

    #[test]
    fn extracts_text_via_css() {
        let html = "<html><body><h1>Hello World</h1></body></html>";
        let doc = Html::parse_document(html);
        let out = extract_field(&doc, html, &[rule("h1")], "https://example.com");
        assert_eq!(out.value.as_deref(), Some("Hello World"));
    }

    #[test]
    fn absolutizes_href_attribute() {
        let html = r#"<html><body><a href="/a/b">link</a></body></html>"#;
        let doc = Html::parse_document(html);
        let mut r = rule("a");
        r.attribute = Some("href".to_string());
        let out = extract_field(&doc, html, &[r], "https://example.com/x/y");
        assert_eq!(out.value.as_deref(), Some("https://example.com/a/b"));
    }

    #[test]
    fn falls_back_to_default_when_nothing_matches() {
        let html = "<html><body></body></html>";
        let doc = Html::parse_document(html);
        let mut r = rule(".missing");
        r.default = Some("fallback".to_string());
        let out = extract_field(&doc, html, &[r], "https://example.com");
        assert_eq!(out.value.as_deref(), Some("fallback"));
    }

    #[test]
    fn meta_strategy_reads_content_attribute_case_insensitively() {
        let html = r#"<html><head><meta property="og:title" content="Big Story"></head></html>"#;
        let doc = Html::parse_document(html);
        let mut r = rule("og:title");
        r.strategy = crate::template::Strategy::Meta;
        let out = extract_field(&doc, html, &[r], "https://example.com");
        assert_eq!(out.value.as_deref(), Some("Big Story"));
    }

    #[test]
    fn json_ld_strategy_resolves_dotted_path() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type": "Article", "headline": "Breaking News"}
        </script></head></html>"#;
        let doc = Html::parse_document(html);
        let mut r = rule("$.headline");
        r.strategy = crate::template::Strategy::JsonLd;
        let out = extract_field(&doc, html, &[r], "https://example.com");
        assert_eq!(out.value.as_deref(), Some("Breaking News"));
    }
}
