//! The Template Matcher (spec §4.5 "Indexing" / "Matching"): selects the
//! highest-priority template whose domain glob matches a request's
//! effective host, falling back to the generic template.

use crate::template::{Template, GENERIC_DOMAIN};

/// Select the template that should handle `effective_host`, per spec
/// §4.5: exact-domain map probe first, then the glob list in
/// priority-then-specificity order, then the generic fallback.
pub fn match_template<'a>(templates: &'a [Template], effective_host: &str) -> Option<&'a Template> {
    if let Some(t) = exact_match(templates, effective_host) {
        return Some(t);
    }

    let mut candidates: Vec<&Template> = templates
        .iter()
        .filter(|t| !t.is_generic())
        .filter(|t| t.domains.iter().any(|d| domain_glob_matches(d, effective_host)))
        .collect();

    candidates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.specificity().cmp(&a.specificity()))
    });

    candidates.into_iter().next().or_else(|| generic(templates))
}

fn exact_match<'a>(templates: &'a [Template], effective_host: &str) -> Option<&'a Template> {
    let mut matches: Vec<&Template> = templates
        .iter()
        .filter(|t| !t.is_generic())
        .filter(|t| t.domains.iter().any(|d| d == effective_host))
        .collect();
    matches.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    matches.into_iter().next()
}

fn generic(templates: &[Template]) -> Option<&Template> {
    templates.iter().find(|t| t.is_generic())
}

/// Exact match, or `*.example.com`-style subdomain wildcard match. A bare
/// `example.com` glob also matches `www.example.com` since `effective_host`
/// already has `www.` stripped by the time it reaches here.
fn domain_glob_matches(glob: &str, effective_host: &str) -> bool {
    match glob.strip_prefix("*.") {
        Some(suffix) => effective_host == suffix || effective_host.ends_with(&format!(".{suffix}")),
        None => glob == effective_host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Filters, OutputConfig, Selectors};

    fn template(name: &str, domains: &[&str], priority: i64) -> Template {
        Template {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            priority,
            selectors: Selectors::default(),
            filters: Filters::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn falls_back_to_generic_when_nothing_matches() {
        let templates = vec![template("generic", &[GENERIC_DOMAIN], 0)];
        let matched = match_template(&templates, "unknown.example").unwrap();
        assert_eq!(matched.name, "generic");
    }

    #[test]
    fn exact_domain_wins_over_glob() {
        let templates = vec![
            template("generic", &[GENERIC_DOMAIN], 0),
            template("wildcard", &["*.example.com"], 5),
            template("exact", &["news.example.com"], 1),
        ];
        let matched = match_template(&templates, "news.example.com").unwrap();
        assert_eq!(matched.name, "exact");
    }

    #[test]
    fn higher_priority_glob_wins_ties_broken_by_specificity() {
        let templates = vec![
            template("generic", &[GENERIC_DOMAIN], 0),
            template("broad", &["*.com"], 3),
            template("narrow", &["*.example.com"], 3),
        ];
        let matched = match_template(&templates, "shop.example.com").unwrap();
        assert_eq!(matched.name, "narrow");
    }
}
