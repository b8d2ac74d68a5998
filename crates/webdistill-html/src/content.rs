//! The single-pass recursive content-block walk (spec §4.6 "Content
//! extraction (the heart)"): turns a chosen container element into the
//! ordered `ContentBlock` tree the Markdown serializer renders.

use scraper::ElementRef;
use webdistill_types::{ContentBlock, InlineRun, TableRow};

const MAX_DATA_URL_BYTES: usize = 256;

/// Walk `container`'s children and produce the document-order block list.
/// `base_url` absolutizes relative `href`/`src` values; `demote_h1` is true
/// when walking the main content container (so `h1` doesn't duplicate the
/// document title — spec §4.6).
pub fn walk_container(container: ElementRef, base_url: &str, demote_h1: bool) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut discarded_data_urls = 0usize;
    walk_children(container, base_url, demote_h1, &mut blocks, &mut discarded_data_urls);
    blocks
}

/// Same as [`walk_container`] but also reports how many `data:` images were
/// discarded, so the executor can record it as a `raw_metadata` flag.
pub fn walk_container_counting(
    container: ElementRef,
    base_url: &str,
    demote_h1: bool,
) -> (Vec<ContentBlock>, usize) {
    let mut blocks = Vec::new();
    let mut discarded = 0usize;
    walk_children(container, base_url, demote_h1, &mut blocks, &mut discarded);
    (blocks, discarded)
}

fn walk_children(
    container: ElementRef,
    base_url: &str,
    demote_h1: bool,
    out: &mut Vec<ContentBlock>,
    discarded_data_urls: &mut usize,
) {
    for child in container.children().filter_map(ElementRef::wrap) {
        if let Some(block) = walk_element(child, base_url, demote_h1, discarded_data_urls) {
            out.push(block);
        } else if is_transparent_container(child.value().name()) {
            walk_children(child, base_url, demote_h1, out, discarded_data_urls);
        }
    }
}

/// Tags with no block meaning of their own whose children should still be
/// visited (e.g. `div`, `section`, `article`, `figure` wrapping an `img`).
fn is_transparent_container(tag: &str) -> bool {
    matches!(
        tag,
        "div" | "section" | "article" | "span" | "figure" | "header" | "footer" | "main" | "aside"
    )
}

fn walk_element(
    el: ElementRef,
    base_url: &str,
    demote_h1: bool,
    discarded_data_urls: &mut usize,
) -> Option<ContentBlock> {
    let tag = el.value().name();
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let n: u8 = tag[1..].parse().unwrap_or(6);
            let level = if demote_h1 && tag == "h1" { n + 1 } else { n }.min(6);
            Some(ContentBlock::Heading {
                level,
                text: collapse(&el.text().collect::<String>()),
            })
        }
        "p" => Some(ContentBlock::Paragraph {
            runs: inline_runs(el, base_url),
        }),
        "ul" | "ol" => Some(ContentBlock::List {
            ordered: tag == "ol",
            items: list_items(el, base_url, discarded_data_urls),
        }),
        "pre" => Some(ContentBlock::CodeBlock {
            language: code_language(el),
            text: el.text().collect::<String>().trim_end_matches('\n').to_string(),
        }),
        "blockquote" => Some(ContentBlock::Quote {
            text: collapse(&el.text().collect::<String>()),
        }),
        "img" => image_block(el, base_url, discarded_data_urls),
        "table" => Some(ContentBlock::Table {
            rows: table_rows(el),
        }),
        _ => None,
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn code_language(pre: ElementRef) -> String {
    let code_el = pre
        .children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == "code")
        .unwrap_or(pre);
    code_el
        .value()
        .classes()
        .find_map(|c| c.strip_prefix("language-"))
        .unwrap_or("")
        .to_string()
}

fn image_block(el: ElementRef, base_url: &str, discarded_data_urls: &mut usize) -> Option<ContentBlock> {
    let src = el.value().attr("src")?;
    if src.starts_with("data:") && src.len() > MAX_DATA_URL_BYTES {
        *discarded_data_urls += 1;
        return None;
    }
    let url = crate::transform::absolutize(src, base_url).unwrap_or_else(|| src.to_string());
    let alt = el.value().attr("alt").unwrap_or("").to_string();
    let caption = figcaption_sibling(el);
    Some(ContentBlock::Image { url, alt, caption })
}

/// An `img`'s caption is read from a sibling `figcaption` inside the same
/// `figure`, if the image's parent is a `figure`.
fn figcaption_sibling(img: ElementRef) -> Option<String> {
    let parent = ElementRef::wrap(img.parent()?)?;
    if parent.value().name() != "figure" {
        return None;
    }
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == "figcaption")
        .map(|c| collapse(&c.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn list_items(list: ElementRef, base_url: &str, discarded_data_urls: &mut usize) -> Vec<Vec<ContentBlock>> {
    list.children()
        .filter_map(ElementRef::wrap)
        .filter(|li| li.value().name() == "li")
        .map(|li| list_item_blocks(li, base_url, discarded_data_urls))
        .collect()
}

/// An `<li>`'s content becomes a paragraph of its direct inline text, plus
/// any nested `ul`/`ol` walked as their own list blocks — this is what makes
/// "nested lists become nested items" (spec §4.6) fall out of the single
/// recursive walk rather than needing special-casing.
fn list_item_blocks(li: ElementRef, base_url: &str, discarded_data_urls: &mut usize) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let direct_text = li
        .children()
        .filter(|c| c.value().is_text())
        .map(|c| c.value().as_text().map(|t| t.to_string()).unwrap_or_default())
        .collect::<String>();
    let direct_text = collapse(&direct_text);
    if !direct_text.is_empty() {
        blocks.push(ContentBlock::Paragraph {
            runs: vec![InlineRun::Text(direct_text)],
        });
    }
    for child in li.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "ul" | "ol" => blocks.push(ContentBlock::List {
                ordered: child.value().name() == "ol",
                items: list_items(child, base_url, discarded_data_urls),
            }),
            _ => {
                if let Some(block) = walk_element(child, base_url, false, discarded_data_urls) {
                    blocks.push(block);
                }
            }
        }
    }
    if blocks.is_empty() {
        blocks.push(ContentBlock::Paragraph {
            runs: inline_runs(li, base_url),
        });
    }
    blocks
}

/// Gather the inline run sequence of `el` (a paragraph or similar): plain
/// text runs interleaved with `a`/`strong`/`em`/`code`/`img` children.
fn inline_runs(el: ElementRef, base_url: &str) -> Vec<InlineRun> {
    let mut runs = Vec::new();
    for child in el.children() {
        if child.value().is_text() {
            let text = child.value().as_text().map(|t| t.to_string()).unwrap_or_default();
            let text = collapse(&text);
            if !text.is_empty() {
                runs.push(InlineRun::Text(text));
            }
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let text = collapse(&child_el.text().collect::<String>());
        match child_el.value().name() {
            "a" => {
                let href = child_el.value().attr("href").unwrap_or("");
                let href = crate::transform::absolutize(href, base_url).unwrap_or_else(|| href.to_string());
                runs.push(InlineRun::Link { text, href });
            }
            "strong" | "b" => runs.push(InlineRun::Bold(text)),
            "em" | "i" => runs.push(InlineRun::Italic(text)),
            "code" => runs.push(InlineRun::Code(text)),
            "img" => {
                let src = child_el.value().attr("src").unwrap_or("");
                let src = crate::transform::absolutize(src, base_url).unwrap_or_else(|| src.to_string());
                let alt = child_el.value().attr("alt").unwrap_or("").to_string();
                runs.push(InlineRun::Image { alt, src });
            }
            _ if !text.is_empty() => runs.push(InlineRun::Text(text)),
            _ => {}
        }
    }
    runs
}

/// Flatten a `table` into ordered rows, marking `<thead>`/`<th>`-only rows
/// as headers per spec §4.6 ("multi-row headers flattened deterministically").
fn table_rows(table: ElementRef) -> Vec<TableRow> {
    let mut rows = Vec::new();
    for section in table.children().filter_map(ElementRef::wrap) {
        match section.value().name() {
            "thead" => {
                for tr in section.children().filter_map(ElementRef::wrap) {
                    if tr.value().name() == "tr" {
                        rows.push(table_row(tr, true));
                    }
                }
            }
            "tbody" | "tfoot" => {
                for tr in section.children().filter_map(ElementRef::wrap) {
                    if tr.value().name() == "tr" {
                        rows.push(table_row(tr, false));
                    }
                }
            }
            "tr" => rows.push(table_row(section, false)),
            _ => {}
        }
    }
    rows
}

fn table_row(tr: ElementRef, in_thead: bool) -> TableRow {
    let cells: Vec<ElementRef> = tr
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect();
    let is_header = in_thead || (!cells.is_empty() && cells.iter().all(|c| c.value().name() == "th"));
    TableRow {
        cells: cells.iter().map(|c| collapse(&c.text().collect::<String>())).collect(),
        is_header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn parse_container(html: &str) -> (Html, String) {
        (Html::parse_document(html), "https://example.com/post".to_string())
    }

    #[test]
    fn demotes_h1_within_main_content() {
        let (doc, base) = parse_container("<div id='c'><h1>Title</h1><p>Body</p></div>");
        let container = doc.select(&scraper::Selector::parse("#c").unwrap()).next().unwrap();
        let blocks = walk_container(container, &base, true);
        assert_eq!(blocks[0], ContentBlock::Heading { level: 2, text: "Title".to_string() });
    }

    #[test]
    fn nested_list_becomes_nested_item() {
        let html = "<div id='c'><ul><li>a<ul><li>nested</li></ul></li><li>b</li></ul></div>";
        let (doc, base) = parse_container(html);
        let container = doc.select(&scraper::Selector::parse("#c").unwrap()).next().unwrap();
        let blocks = walk_container(container, &base, false);
        let ContentBlock::List { items, .. } = &blocks[0] else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 2);
        assert!(items[0].iter().any(|b| matches!(b, ContentBlock::List { .. })));
    }

    #[test]
    fn code_block_reads_language_from_class() {
        let html = "<div id='c'><pre><code class='language-rust'>fn main() {}</code></pre></div>";
        let (doc, base) = parse_container(html);
        let container = doc.select(&scraper::Selector::parse("#c").unwrap()).next().unwrap();
        let blocks = walk_container(container, &base, false);
        assert_eq!(
            blocks[0],
            ContentBlock::CodeBlock {
                language: "rust".to_string(),
                text: "fn main() {}".to_string()
            }
        );
    }

    #[test]
    fn discards_large_data_url_images_and_counts_them() {
        let big_data_url = format!("data:image/png;base64,{}", "A".repeat(300));
        let html = format!("<div id='c'><img src='{big_data_url}' alt='x'></div>");
        let (doc, base) = parse_container(&html);
        let container = doc.select(&scraper::Selector::parse("#c").unwrap()).next().unwrap();
        let (blocks, discarded) = walk_container_counting(container, &base, false);
        assert!(blocks.is_empty());
        assert_eq!(discarded, 1);
    }

    #[test]
    fn table_flattens_thead_and_tbody_rows() {
        let html = "<div id='c'><table><thead><tr><th>A</th><th>B</th></tr></thead><tbody><tr><td>1</td><td>2</td></tr></tbody></table></div>";
        let (doc, base) = parse_container(html);
        let container = doc.select(&scraper::Selector::parse("#c").unwrap()).next().unwrap();
        let blocks = walk_container(container, &base, false);
        let ContentBlock::Table { rows } = &blocks[0] else {
            panic!("expected table");
        };
        assert!(rows[0].is_header);
        assert!(!rows[1].is_header);
        assert_eq!(rows[1].cells, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn figcaption_sibling_becomes_image_caption() {
        let html = "<div id='c'><figure><img src='/a.png' alt='a pic'><figcaption>A caption</figcaption></figure></div>";
        let (doc, base) = parse_container(html);
        let container = doc.select(&scraper::Selector::parse("#c").unwrap()).next().unwrap();
        let blocks = walk_container(container, &base, false);
        assert_eq!(
            blocks[0],
            ContentBlock::Image {
                url: "https://example.com/a.png".to_string(),
                alt: "a pic".to_string(),
                caption: Some("A caption".to_string()),
            }
        );
    }
}
