//! The Markdown Serializer (spec §4.7): a pure, deterministic function from
//! `ExtractedDocument` to a Markdown string. No network or filesystem
//! access — every input is already in memory.

use serde_yaml::Value;
use webdistill_types::{ContentBlock, ExtractedDocument, InlineRun, TableRow};

const MAX_PIPE_TABLE_COLUMNS: usize = 10;

/// Render `doc` to Markdown: YAML front-matter, then `# {title}`, then the
/// content blocks in order. Trims trailing whitespace and ensures the
/// output ends in exactly one `\n`.
pub fn serialize(doc: &ExtractedDocument) -> String {
    let mut out = String::new();
    out.push_str(&front_matter(doc));
    out.push_str(&format!("# {}\n", doc.title));

    for block in &doc.content_blocks {
        out.push('\n');
        render_block(&mut out, block, 0);
    }

    finalize(out)
}

/// Build the YAML front-matter block via `serde_yaml`, so quoting/escaping
/// of scalars (colons, leading `#`, etc.) follows the same rules as every
/// other YAML document this crate family reads and writes, rather than a
/// bespoke escaper.
fn front_matter(doc: &ExtractedDocument) -> String {
    let mut map = serde_yaml::Mapping::new();
    let mut set = |key: &str, value: String| {
        map.insert(Value::String(key.to_string()), Value::String(value));
    };
    set("title", doc.title.clone());
    set("url", doc.url.clone());
    if let Some(author) = &doc.author {
        set("author", author.clone());
    }
    if let Some(publish_time) = &doc.publish_time {
        set("publish_time", publish_time.clone());
    }
    if let Some(source) = &doc.source_name {
        set("source", source.clone());
    }
    if let Some(language) = &doc.language {
        set("language", language.clone());
    }
    if !doc.categories.is_empty() {
        set("categories", doc.categories.join(", "));
    }
    if !doc.tags.is_empty() {
        set("tags", doc.tags.join(", "));
    }
    if let Some(cover) = &doc.cover_image_url {
        set("cover_image_url", cover.clone());
    }
    for (k, v) in &doc.raw_metadata {
        set(k, v.clone());
    }

    let yaml = serde_yaml::to_string(&map).unwrap_or_default();
    let body = yaml.strip_prefix("---\n").unwrap_or(&yaml);
    format!("---\n{body}---\n\n")
}

fn indent(level: usize) -> String {
    "  ".repeat(level)
}

fn render_block(out: &mut String, block: &ContentBlock, depth: usize) {
    match block {
        ContentBlock::Heading { level, text } => {
            let hashes = "#".repeat((*level).clamp(2, 6) as usize);
            out.push_str(&format!("{hashes} {text}\n\n"));
        }
        ContentBlock::Paragraph { runs } => {
            out.push_str(&render_runs(runs));
            out.push_str("\n\n");
        }
        ContentBlock::List { ordered, items } => {
            render_list(out, *ordered, items, depth);
            out.push('\n');
        }
        ContentBlock::CodeBlock { language, text } => {
            out.push_str(&format!("```{language}\n{text}\n```\n\n"));
        }
        ContentBlock::Quote { text } => {
            for line in text.lines() {
                out.push_str(&format!("> {line}\n"));
            }
            out.push('\n');
        }
        ContentBlock::Image { url, alt, caption } => {
            out.push_str(&format!("![{alt}]({url})\n"));
            if let Some(caption) = caption {
                out.push_str(&format!("*{caption}*\n"));
            }
            out.push('\n');
        }
        ContentBlock::Table { rows } => {
            render_table(out, rows);
        }
    }
}

fn render_list(out: &mut String, ordered: bool, items: &[Vec<ContentBlock>], depth: usize) {
    for (idx, item_blocks) in items.iter().enumerate() {
        let prefix = if ordered {
            format!("{}. ", idx + 1)
        } else {
            "- ".to_string()
        };
        let mut first_line = true;
        for block in item_blocks {
            match block {
                ContentBlock::List { ordered: nested_ordered, items: nested_items } => {
                    render_list(out, *nested_ordered, nested_items, depth + 1);
                }
                ContentBlock::Paragraph { runs } => {
                    let line = render_runs(runs);
                    if first_line {
                        out.push_str(&format!("{}{}{}\n", indent(depth), prefix, line));
                        first_line = false;
                    } else {
                        out.push_str(&format!("{}  {}\n", indent(depth), line));
                    }
                }
                other => {
                    let mut rendered = String::new();
                    render_block(&mut rendered, other, depth + 1);
                    for line in rendered.lines() {
                        out.push_str(&format!("{}  {}\n", indent(depth), line));
                    }
                }
            }
        }
    }
}

fn render_runs(runs: &[InlineRun]) -> String {
    runs.iter()
        .map(|run| match run {
            InlineRun::Text(t) => t.clone(),
            InlineRun::Bold(t) => format!("**{t}**"),
            InlineRun::Italic(t) => format!("*{t}*"),
            InlineRun::Code(t) => format!("`{t}`"),
            InlineRun::Link { text, href } => format!("[{text}]({href})"),
            InlineRun::Image { alt, src } => format!("![{alt}]({src})"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_table(out: &mut String, rows: &[TableRow]) {
    let max_cols = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
    if max_cols == 0 {
        return;
    }
    if max_cols <= MAX_PIPE_TABLE_COLUMNS {
        render_pipe_table(out, rows, max_cols);
    } else {
        render_table_as_list(out, rows);
    }
}

fn render_pipe_table(out: &mut String, rows: &[TableRow], max_cols: usize) {
    let header_row = rows.iter().find(|r| r.is_header);
    let header_cells: Vec<String> = match header_row {
        Some(r) => padded(&r.cells, max_cols),
        None => (0..max_cols).map(|i| format!("Column {}", i + 1)).collect(),
    };
    out.push_str(&format!("| {} |\n", header_cells.join(" | ")));
    out.push_str(&format!("|{}|\n", " --- |".repeat(max_cols)));

    for row in rows.iter().filter(|r| header_row.map(|h| !std::ptr::eq(*r, h)).unwrap_or(true)) {
        let cells = padded(&row.cells, max_cols);
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out.push('\n');
}

fn padded(cells: &[String], width: usize) -> Vec<String> {
    let mut out: Vec<String> = cells.to_vec();
    out.resize(width, String::new());
    out
}

/// Wide tables (more than [`MAX_PIPE_TABLE_COLUMNS`] columns) don't read
/// well as pipe syntax, so each row becomes a bullet of `header: value`
/// pairs instead.
fn render_table_as_list(out: &mut String, rows: &[TableRow]) {
    let header = rows.iter().find(|r| r.is_header).map(|r| r.cells.clone());
    for row in rows.iter().filter(|r| !r.is_header) {
        out.push_str("- ");
        let mut first = true;
        for (idx, cell) in row.cells.iter().enumerate() {
            let label = header
                .as_ref()
                .and_then(|h| h.get(idx))
                .cloned()
                .unwrap_or_else(|| format!("Column {}", idx + 1));
            if !first {
                out.push_str(", ");
            }
            out.push_str(&format!("{label}: {cell}"));
            first = false;
        }
        out.push('\n');
    }
    out.push('\n');
}

fn finalize(out: String) -> String {
    let trimmed_lines: Vec<String> = out.lines().map(|l| l.trim_end().to_string()).collect();
    let mut result = trimmed_lines.join("\n");
    result.push('\n');
    while result.ends_with("\n\n") {
        result.pop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn doc() -> ExtractedDocument {
        ExtractedDocument {
            url: "https://example.com/a".to_string(),
            title: "Hello World".to_string(),
            author: Some("Jane Doe".to_string()),
            publish_time: Some("2024-03-01".to_string()),
            source_name: Some("example.com".to_string()),
            language: Some("en".to_string()),
            content_blocks: vec![],
            categories: vec![],
            tags: vec![],
            cover_image_url: None,
            raw_metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn front_matter_includes_core_fields_in_order() {
        let md = serialize(&doc());
        let front = md.split("---\n").nth(1).unwrap();
        assert!(front.starts_with("title: Hello World\n"));
        assert!(front.contains("author: Jane Doe\n"));
        assert!(front.contains("publish_time: 2024-03-01\n"));
    }

    #[test]
    fn ends_with_exactly_one_newline_and_no_trailing_whitespace() {
        let md = serialize(&doc());
        assert!(md.ends_with('\n'));
        assert!(!md.ends_with("\n\n"));
        assert!(md.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn heading_blocks_render_with_blank_lines() {
        let mut d = doc();
        d.content_blocks.push(ContentBlock::Heading { level: 2, text: "Section".to_string() });
        let md = serialize(&d);
        assert!(md.contains("## Section\n\n"));
    }

    #[test]
    fn paragraph_renders_inline_formatting() {
        let mut d = doc();
        d.content_blocks.push(ContentBlock::Paragraph {
            runs: vec![
                InlineRun::Text("See".to_string()),
                InlineRun::Link { text: "this".to_string(), href: "https://x.test".to_string() },
                InlineRun::Bold("now".to_string()),
            ],
        });
        let md = serialize(&d);
        assert!(md.contains("See [this](https://x.test) **now**"));
    }

    #[test]
    fn code_block_fences_with_language() {
        let mut d = doc();
        d.content_blocks.push(ContentBlock::CodeBlock {
            language: "rust".to_string(),
            text: "fn main() {}".to_string(),
        });
        let md = serialize(&d);
        assert!(md.contains("```rust\nfn main() {}\n```"));
    }

    #[test]
    fn nested_list_indents_two_spaces_per_level() {
        let mut d = doc();
        d.content_blocks.push(ContentBlock::List {
            ordered: false,
            items: vec![vec![
                ContentBlock::Paragraph { runs: vec![InlineRun::Text("outer".to_string())] },
                ContentBlock::List {
                    ordered: false,
                    items: vec![vec![ContentBlock::Paragraph {
                        runs: vec![InlineRun::Text("inner".to_string())],
                    }]],
                },
            ]],
        });
        let md = serialize(&d);
        assert!(md.contains("- outer"));
        assert!(md.contains("  - inner"));
    }

    #[test]
    fn narrow_table_uses_pipe_syntax() {
        let mut d = doc();
        d.content_blocks.push(ContentBlock::Table {
            rows: vec![
                TableRow { cells: vec!["A".to_string(), "B".to_string()], is_header: true },
                TableRow { cells: vec!["1".to_string(), "2".to_string()], is_header: false },
            ],
        });
        let md = serialize(&d);
        assert!(md.contains("| A | B |"));
        assert!(md.contains("| --- | --- |"));
        assert!(md.contains("| 1 | 2 |"));
    }

    #[test]
    fn wide_table_falls_back_to_nested_list() {
        let mut d = doc();
        let header: Vec<String> = (1..=12).map(|i| format!("H{i}")).collect();
        let row: Vec<String> = (1..=12).map(|i| format!("v{i}")).collect();
        d.content_blocks.push(ContentBlock::Table {
            rows: vec![
                TableRow { cells: header, is_header: true },
                TableRow { cells: row, is_header: false },
            ],
        });
        let md = serialize(&d);
        assert!(!md.contains("| H1 |"));
        assert!(md.contains("H1: v1"));
    }

    #[test]
    fn standalone_image_includes_italic_caption() {
        let mut d = doc();
        d.content_blocks.push(ContentBlock::Image {
            url: "https://example.com/a.png".to_string(),
            alt: "a pic".to_string(),
            caption: Some("A caption".to_string()),
        });
        let md = serialize(&d);
        assert!(md.contains("![a pic](https://example.com/a.png)\n*A caption*"));
    }
}
