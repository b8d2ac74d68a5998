//! # WebDistill HTML
//!
//! The Template Store & Matcher (spec §4.5) and the Extraction Executor
//! (spec §4.6): turns raw HTML plus a selected [`template::Template`] into
//! an [`webdistill_types::ExtractedDocument`].

pub mod cleanup;
pub mod content;
pub mod executor;
pub mod matcher;
pub mod selector;
pub mod store;
pub mod template;
pub mod transform;
pub mod xpath;

pub use executor::{extract, ExtractionOutcome};
pub use matcher::match_template;
pub use store::TemplateStore;
pub use template::Template;
