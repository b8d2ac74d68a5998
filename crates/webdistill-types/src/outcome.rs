//! Per-request outcome record emitted by the Orchestrator (§4.8 step 6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// `{url, final_url, fetcher_used, template_used, elapsed_ms per phase,
/// error_kind (if any), content_char_count}` from §4.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub url: String,
    pub final_url: String,
    pub fetcher_used: String,
    pub template_used: String,
    pub elapsed_ms_by_phase: BTreeMap<String, u64>,
    pub error_kind: Option<ErrorKind>,
    pub content_char_count: usize,
}

impl OutcomeRecord {
    pub fn total_elapsed_ms(&self) -> u64 {
        self.elapsed_ms_by_phase.values().sum()
    }
}
