//! # WebDistill Markdown
//!
//! Deterministic serialization of [`ExtractedDocument`] to Markdown (spec
//! §4.7): YAML front-matter, `# title`, then `content_blocks` in order.

mod serializer;

pub use serializer::serialize;
