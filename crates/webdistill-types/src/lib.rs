//! # WebDistill Types
//!
//! Shared type definitions used across the fetch-routing and extraction
//! crates. Kept dependency-light so both `webdistill-fetch` and
//! `webdistill-html` can depend on it without pulling each other in.
//!
//! ## Organization
//!
//! - `error`: the closed `ErrorKind` taxonomy and the `WebDistillError` wrapper.
//! - `fetch`: `FetchContext`, `FetchPlan`, `FetchResult`, wait strategies.
//! - `document`: `ExtractedDocument` and its content block tree.
//! - `outcome`: the per-request outcome record emitted by the orchestrator.

pub mod document;
pub mod error;
pub mod fetch;
pub mod outcome;

pub use document::{ContentBlock, ExtractedDocument, InlineRun, TableRow};
pub use error::{ErrorKind, Result, WebDistillError};
pub use fetch::{FetchContext, FetchPlan, FetchResult, WaitUntil};
pub use outcome::OutcomeRecord;
