//! Pre-cleanup filters (spec §4.6 "Pre-cleanup"): structural removal of
//! elements before any field extraction reads the tree. Order: ids first,
//! then classes, then the selector list, then regex against remaining text.

use ego_tree::NodeId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::template::Filters;

/// Apply `filters` to `document` in place.
pub fn apply_filters(document: &mut Html, filters: &Filters) {
    for id in &filters.ids_to_remove {
        detach_matching(document, &format!("#{}", css_escape(id)));
    }
    for class in &filters.css_classes_to_remove {
        detach_matching(document, &format!(".{}", css_escape(class)));
    }
    for selector in &filters.remove_selectors {
        detach_matching(document, selector);
    }
    for pattern in &filters.remove_patterns {
        strip_text_pattern(document, pattern);
    }
}

fn detach_matching(document: &mut Html, selector_str: &str) {
    let Ok(selector) = Selector::parse(selector_str) else {
        tracing::warn!(selector = selector_str, "invalid remove selector, skipping");
        return;
    };
    let ids: Vec<NodeId> = document.select(&selector).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Strip any text matching `pattern` from the document's text content.
/// Runs on the serialized tree and re-parses, rather than mutating
/// individual text nodes in place: scraper's tree editing API is built for
/// structural removal (`detach`), not in-place text rewriting, so the
/// round-trip through serialization is the direct way to apply a text-level
/// regex and keep the result a well-formed tree.
fn strip_text_pattern(document: &mut Html, pattern: &str) {
    let Ok(re) = Regex::new(pattern) else {
        tracing::warn!(pattern, "invalid remove_patterns regex, skipping");
        return;
    };
    let rendered = document.root_element().html();
    let replaced = re.replace_all(&rendered, "");
    *document = Html::parse_fragment(&replaced);
}

/// Minimal CSS identifier escaping sufficient for class/id names coming
/// from template YAML (not general CSS.escape — those values are
/// author-controlled config, not untrusted HTML).
fn css_escape(raw: &str) -> String {
    raw.chars()
        .flat_map(|c| if ".#: ".contains(c) { vec!['\\', c] } else { vec![c] })
        .collect()
}

pub fn select_first<'a>(document: &'a Html, selector: &Selector) -> Option<ElementRef<'a>> {
    document.select(selector).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Filters;

    #[test]
    fn removes_elements_by_id_class_and_selector() {
        let html = r#"<html><body>
            <div id="comments">bye</div>
            <div class="navbox">nav</div>
            <script>evil()</script>
            <p>keep me</p>
        </body></html>"#;
        let mut doc = Html::parse_document(html);
        let filters = Filters {
            ids_to_remove: vec!["comments".to_string()],
            css_classes_to_remove: vec!["navbox".to_string()],
            remove_selectors: vec!["script".to_string()],
            remove_patterns: vec![],
        };
        apply_filters(&mut doc, &filters);

        let rendered = doc.root_element().html();
        assert!(!rendered.contains("bye"));
        assert!(!rendered.contains("nav"));
        assert!(!rendered.contains("evil()"));
        assert!(rendered.contains("keep me"));
    }

    #[test]
    fn removes_elements_whose_id_contains_dots() {
        let html = r#"<html><body>
            <div id="mw-empty-elt.foo">bye</div>
            <p>keep me</p>
        </body></html>"#;
        let mut doc = Html::parse_document(html);
        let filters = Filters {
            ids_to_remove: vec!["mw-empty-elt.foo".to_string()],
            ..Default::default()
        };
        apply_filters(&mut doc, &filters);

        let rendered = doc.root_element().html();
        assert!(!rendered.contains("bye"));
        assert!(rendered.contains("keep me"));
    }

    #[test]
    fn strips_text_matching_regex_pattern() {
        let html = "<p>Advertisement: buy now! Real content.</p>";
        let mut doc = Html::parse_document(html);
        let filters = Filters {
            remove_patterns: vec!["Advertisement: buy now! ".to_string()],
            ..Default::default()
        };
        apply_filters(&mut doc, &filters);
        let rendered = doc.root_element().html();
        assert!(!rendered.contains("Advertisement"));
        assert!(rendered.contains("Real content."));
    }
}
