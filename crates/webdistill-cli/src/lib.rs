//! # WebDistill CLI / Orchestrator
//!
//! The Orchestrator (spec §4.8) lives here as a library so the `webdistill`
//! binary stays a thin CLI collaborator (spec §4.9) with no routing,
//! fetch, or extraction logic of its own.

mod orchestrator;

pub use orchestrator::{Orchestrator, OrchestratorOutput, OrchestratorRequest, OutputError, OutputMetadata};
