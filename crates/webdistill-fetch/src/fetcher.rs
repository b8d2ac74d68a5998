//! The `Fetcher` trait every plugin implements (spec §4.4: "All plugins
//! satisfy `fetch(FetchContext, FetchPlan) → FetchResult`. They are the
//! only components allowed to perform network I/O.").

use async_trait::async_trait;
use webdistill_types::{FetchContext, FetchPlan, FetchResult};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stable identifier matching `fetcher_id` in routing YAML
    /// (`static_http`, `headless_browser`, `browser_attach`).
    fn id(&self) -> &'static str;

    async fn fetch(&self, ctx: &FetchContext, plan: &FetchPlan) -> FetchResult;
}

/// Cap a response body at `max_bytes` (spec §4.4.4: "Response bodies above
/// a configured cap ... are truncated at the cap; extraction still
/// attempted on truncated HTML; metadata records truncation."). Returns
/// whether truncation happened so the caller can set `FetchResult::truncated`.
pub fn truncate_body(mut body: Vec<u8>, max_bytes: usize) -> (Vec<u8>, bool) {
    if body.len() > max_bytes {
        body.truncate(max_bytes);
        (body, true)
    } else {
        (body, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_when_over_cap() {
        let (body, truncated) = truncate_body(vec![0u8; 100], 10);
        assert_eq!(body.len(), 10);
        assert!(truncated);
    }

    #[test]
    fn leaves_body_untouched_when_under_cap() {
        let (body, truncated) = truncate_body(vec![0u8; 5], 10);
        assert_eq!(body.len(), 5);
        assert!(!truncated);
    }
}
