//! The normalized intermediate between parsed HTML and rendered Markdown.
//!
//! `ExtractedDocument` is a pure tree: it never borrows from the DOM it was
//! built from and carries no parent pointers, so it can freely outlive the
//! parser's arena.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single inline formatting run inside a paragraph, preserved so the
/// Markdown serializer can restore emphasis/links/code spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InlineRun {
    Text(String),
    Bold(String),
    Italic(String),
    Code(String),
    Link { text: String, href: String },
    Image { alt: String, src: String },
}

/// One row of a `table` block: ordered cell text, with a flag marking
/// header rows (`<thead>` or a `<th>`-only row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<String>,
    pub is_header: bool,
}

/// A typed block produced by the Extraction Executor's single-pass content
/// walk. Order within `ExtractedDocument::content_blocks` is document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        runs: Vec<InlineRun>,
    },
    List {
        ordered: bool,
        items: Vec<Vec<ContentBlock>>,
    },
    CodeBlock {
        language: String,
        text: String,
    },
    Quote {
        text: String,
    },
    Image {
        url: String,
        alt: String,
        caption: Option<String>,
    },
    Table {
        rows: Vec<TableRow>,
    },
}

impl ContentBlock {
    /// Sum of non-whitespace characters contained in this block, used by
    /// the quality policy's `content_char_count` computation.
    pub fn non_whitespace_char_count(&self) -> usize {
        fn count(s: &str) -> usize {
            s.chars().filter(|c| !c.is_whitespace()).count()
        }
        match self {
            ContentBlock::Heading { text, .. } => count(text),
            ContentBlock::Paragraph { runs } => runs
                .iter()
                .map(|r| match r {
                    InlineRun::Text(t)
                    | InlineRun::Bold(t)
                    | InlineRun::Italic(t)
                    | InlineRun::Code(t) => count(t),
                    InlineRun::Link { text, .. } => count(text),
                    InlineRun::Image { alt, .. } => count(alt),
                })
                .sum(),
            ContentBlock::List { items, .. } => items
                .iter()
                .flat_map(|item| item.iter())
                .map(ContentBlock::non_whitespace_char_count)
                .sum(),
            ContentBlock::CodeBlock { text, .. } => count(text),
            ContentBlock::Quote { text } => count(text),
            ContentBlock::Image { alt, caption, .. } => {
                count(alt) + caption.as_deref().map(count).unwrap_or(0)
            }
            ContentBlock::Table { rows } => rows
                .iter()
                .flat_map(|r| r.cells.iter())
                .map(|c| count(c))
                .sum(),
        }
    }
}

/// The normalized output of the Extraction Executor, ready for Markdown
/// serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub publish_time: Option<String>,
    pub source_name: Option<String>,
    pub language: Option<String>,
    pub content_blocks: Vec<ContentBlock>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub cover_image_url: Option<String>,
    /// Free-form fields contributed by a template's `raw_metadata.*`
    /// selectors, plus executor-recorded flags (`date_parse_failed`,
    /// `truncated`, `data_url_images_discarded`). Sorted map so the
    /// Markdown front-matter serialization is deterministic.
    pub raw_metadata: BTreeMap<String, String>,
}

impl ExtractedDocument {
    /// Sum of non-whitespace characters across all content blocks — the
    /// quality signal the orchestrator uses to decide whether to retry with
    /// the generic template.
    pub fn content_char_count(&self) -> usize {
        self.content_blocks
            .iter()
            .map(ContentBlock::non_whitespace_char_count)
            .sum()
    }

    /// Invariant check from §3: title non-empty, and content_blocks
    /// non-empty or the extraction is a failure.
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.content_blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_char_count_sums_non_whitespace_across_blocks() {
        let doc = ExtractedDocument {
            content_blocks: vec![
                ContentBlock::Heading {
                    level: 2,
                    text: "Hi".to_string(),
                },
                ContentBlock::Paragraph {
                    runs: vec![InlineRun::Text("World.".to_string())],
                },
            ],
            ..Default::default()
        };
        assert_eq!(doc.content_char_count(), 2 + 6);
    }

    #[test]
    fn well_formed_requires_title_and_blocks() {
        let mut doc = ExtractedDocument::default();
        assert!(!doc.is_well_formed());
        doc.title = "Hello".to_string();
        assert!(!doc.is_well_formed());
        doc.content_blocks.push(ContentBlock::Quote {
            text: "x".to_string(),
        });
        assert!(doc.is_well_formed());
    }
}
