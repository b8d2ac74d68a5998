//! The Extraction Executor (spec §4.6): turns raw HTML plus a selected
//! [`Template`] into an [`ExtractedDocument`]. One call here is "apply this
//! template once" — the quality-policy retry-with-generic-template decision
//! lives in the orchestrator, which calls [`extract`] up to twice.

use webdistill_types::ExtractedDocument;

use crate::cleanup;
use crate::content;
use crate::selector::{extract_field, extract_list, resolve_container};
use crate::template::Template;

/// Outcome of applying one template to one HTML document.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub document: ExtractedDocument,
}

/// Parse `raw_html`, apply `template`'s pre-cleanup filters, extract every
/// field, and walk the content container into `content_blocks`.
///
/// HTML5 parsing (`scraper::Html::parse_document`) always succeeds per
/// spec §3 — malformed markup degrades gracefully rather than erroring.
pub fn extract(raw_html: &str, base_url: &str, template: &Template) -> ExtractionOutcome {
    let mut document = scraper::Html::parse_document(raw_html);
    cleanup::apply_filters(&mut document, &template.filters);
    let cleaned_html = document.root_element().html();

    let title = extract_named_field(&document, &cleaned_html, &template.selectors.title, base_url);
    let author = extract_named_field(&document, &cleaned_html, &template.selectors.author, base_url);
    let date = extract_named_field(&document, &cleaned_html, &template.selectors.date, base_url);
    let cover_image = extract_named_field(&document, &cleaned_html, &template.selectors.cover_image, base_url);

    let categories = extract_list_field(&document, &cleaned_html, &template.selectors.categories, base_url);
    let tags = extract_list_field(&document, &cleaned_html, &template.selectors.tags, base_url);

    let mut raw_metadata: std::collections::BTreeMap<String, String> = std::collections::BTreeMap::new();
    for (key, spec) in &template.selectors.raw_metadata {
        let outcome = extract_field(&document, &cleaned_html, &spec.rules(), base_url);
        if let Some(value) = outcome.value {
            raw_metadata.insert(key.clone(), value);
        }
        for (flag, detail) in outcome.flags {
            raw_metadata.insert(flag, detail);
        }
    }
    for (flag, detail) in date.flags.iter().chain(title.flags.iter()) {
        raw_metadata.insert(flag.clone(), detail.clone());
    }

    let content_rules = template.selectors.content.as_ref().map(|s| s.rules()).unwrap_or_default();
    let demote_h1 = !title_selector_overlaps_content(template);
    let (content_blocks, discarded_data_urls) = match resolve_container(&document, &content_rules) {
        Some(container) => content::walk_container_counting(container, base_url, demote_h1),
        None => (Vec::new(), 0),
    };
    if discarded_data_urls > 0 {
        raw_metadata.insert("data_url_images_discarded".to_string(), discarded_data_urls.to_string());
    }

    let document_out = ExtractedDocument {
        url: base_url.to_string(),
        title: title.value.unwrap_or_default(),
        author: author.value,
        publish_time: date.value,
        source_name: template_source_name(template),
        language: raw_metadata.get("language").cloned(),
        content_blocks,
        categories,
        tags,
        cover_image_url: cover_image.value,
        raw_metadata,
    };

    ExtractionOutcome { document: document_out }
}

/// Templates almost always demote `h1` within content (spec default); the
/// one exception is a template whose `title` selector and `content`
/// selector are the same container, where demoting would double-handle the
/// same heading. We detect that narrow case by comparing selector strings.
fn title_selector_overlaps_content(template: &Template) -> bool {
    let (Some(title), Some(content)) = (&template.selectors.title, &template.selectors.content) else {
        return false;
    };
    let title_rules = title.rules();
    let content_rules = content.rules();
    title_rules
        .first()
        .zip(content_rules.first())
        .map(|(t, c)| t.selector == c.selector)
        .unwrap_or(false)
}

fn template_source_name(template: &Template) -> Option<String> {
    template.domains.iter().find(|d| *d != crate::template::GENERIC_DOMAIN).cloned()
}

fn extract_named_field(
    document: &scraper::Html,
    raw_html: &str,
    spec: &Option<crate::template::SelectorSpec>,
    base_url: &str,
) -> crate::selector::FieldOutcome {
    let rules = spec.as_ref().map(|s| s.rules()).unwrap_or_default();
    extract_field(document, raw_html, &rules, base_url)
}

fn extract_list_field(
    document: &scraper::Html,
    raw_html: &str,
    spec: &Option<crate::template::SelectorSpec>,
    base_url: &str,
) -> Vec<String> {
    let Some(spec) = spec else {
        return Vec::new();
    };
    extract_list(document, raw_html, &spec.rules(), base_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Filters, OutputConfig, Selectors, SelectorSpec};

    fn base_template() -> Template {
        Template {
            name: "test".to_string(),
            version: "1.0.0".to_string(),
            domains: vec!["example.com".to_string()],
            priority: 0,
            selectors: Selectors::default(),
            filters: Filters::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn extracts_title_and_content_blocks() {
        let html = r#"<html><body>
            <h1 class="headline">Big News</h1>
            <div class="article-body"><p>Something happened today.</p></div>
        </body></html>"#;
        let mut template = base_template();
        template.selectors.title = Some(SelectorSpec::Css(".headline".to_string()));
        template.selectors.content = Some(SelectorSpec::Css(".article-body".to_string()));

        let outcome = extract(html, "https://example.com/a", &template);
        assert_eq!(outcome.document.title, "Big News");
        assert_eq!(outcome.document.content_blocks.len(), 1);
        assert!(outcome.document.content_char_count() > 0);
    }

    #[test]
    fn missing_content_selector_yields_empty_blocks() {
        let html = "<html><body><h1>Title</h1></body></html>";
        let mut template = base_template();
        template.selectors.title = Some(SelectorSpec::Css("h1".to_string()));
        let outcome = extract(html, "https://example.com/a", &template);
        assert!(outcome.document.content_blocks.is_empty());
        assert!(!outcome.document.is_well_formed());
    }

    #[test]
    fn applies_pre_cleanup_filters_before_extraction() {
        let html = r#"<html><body>
            <div class="ad">Buy now</div>
            <div class="article-body"><p>Real content.</p></div>
        </body></html>"#;
        let mut template = base_template();
        template.selectors.content = Some(SelectorSpec::Css(".article-body".to_string()));
        template.filters.css_classes_to_remove = vec!["ad".to_string()];

        let outcome = extract(html, "https://example.com/a", &template);
        let rendered = format!("{:?}", outcome.document.content_blocks);
        assert!(!rendered.contains("Buy now"));
        assert!(rendered.contains("Real content."));
    }
}
