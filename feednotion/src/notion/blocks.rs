use serde_json::{json, Value};

use common::ContentMode;

use crate::llm::summarizer::split_output;
use crate::scraping::truncate_chars;

/// Notion rejects rich-text runs longer than this.
pub const MAX_RICH_TEXT_CHARS: usize = 2000;

/// Substring of the heading that marks a page as already carrying generated content.
pub const TRANSLATION_MARKER: &str = "번역";

/// A page body block, in the subset of Notion block types this crate writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Bookmark(String),
    Heading(String),
    Paragraph(String),
    Bullet(String),
}

pub(crate) fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": truncate_chars(content, MAX_RICH_TEXT_CHARS) } }])
}

fn plain_text(rich: Option<&Value>) -> String {
    rich.and_then(Value::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|run| {
                    run.get("plain_text")
                        .or_else(|| run.pointer("/text/content"))
                        .and_then(Value::as_str)
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

impl ContentBlock {
    pub fn to_notion(&self) -> Value {
        match self {
            ContentBlock::Bookmark(url) => json!({
                "object": "block",
                "type": "bookmark",
                "bookmark": { "url": url }
            }),
            ContentBlock::Heading(text) => json!({
                "object": "block",
                "type": "heading_2",
                "heading_2": { "rich_text": rich_text(text) }
            }),
            ContentBlock::Paragraph(text) => json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": rich_text(text) }
            }),
            ContentBlock::Bullet(text) => json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": { "rich_text": rich_text(text) }
            }),
        }
    }

    /// Read a block returned by the API. Block types outside this enum are `None`;
    /// headings of every level map to `Heading`.
    pub fn from_notion(block: &Value) -> Option<Self> {
        let kind = block.get("type")?.as_str()?;
        let body = block.get(kind)?;
        let text = || plain_text(body.get("rich_text"));
        match kind {
            "bookmark" => Some(ContentBlock::Bookmark(body.get("url")?.as_str()?.to_string())),
            "heading_1" | "heading_2" | "heading_3" => Some(ContentBlock::Heading(text())),
            "paragraph" => Some(ContentBlock::Paragraph(text())),
            "bulleted_list_item" => Some(ContentBlock::Bullet(text())),
            _ => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ContentBlock::Bookmark(s)
            | ContentBlock::Heading(s)
            | ContentBlock::Paragraph(s)
            | ContentBlock::Bullet(s) => s,
        }
    }
}

pub fn heading_label(mode: ContentMode) -> &'static str {
    match mode {
        ContentMode::Translate => "번역 (KR)",
        ContentMode::Short | ContentMode::Detailed => "요약 (KR)",
    }
}

/// True when some heading carries the translation marker or the label `mode` would write.
pub fn has_generated_heading(blocks: &[ContentBlock], mode: ContentMode) -> bool {
    let label = heading_label(mode);
    blocks.iter().any(|b| match b {
        ContentBlock::Heading(text) => text.contains(TRANSLATION_MARKER) || text.contains(label),
        _ => false,
    })
}

/// Model output rendered as body blocks: bullets in detailed mode, paragraphs otherwise.
pub fn body_blocks(mode: ContentMode, output: &str) -> Vec<ContentBlock> {
    split_output(mode, output)
        .into_iter()
        .map(|entry| match mode {
            ContentMode::Detailed => ContentBlock::Bullet(entry),
            ContentMode::Short | ContentMode::Translate => ContentBlock::Paragraph(entry),
        })
        .collect()
}

/// Page body: optional bookmark, then a heading over the generated body. When
/// generation produced nothing the summary becomes the only paragraph; with
/// neither there is no heading at all.
pub fn compose_body(
    mode: ContentMode,
    bookmark: Option<&str>,
    generated: Option<&str>,
    summary: Option<&str>,
) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    if let Some(url) = bookmark {
        blocks.push(ContentBlock::Bookmark(url.to_string()));
    }

    let mut body = generated.map(|g| body_blocks(mode, g)).unwrap_or_default();
    if body.is_empty() {
        if let Some(s) = summary.map(str::trim).filter(|s| !s.is_empty()) {
            body.push(ContentBlock::Paragraph(s.to_string()));
        }
    }

    if !body.is_empty() {
        blocks.push(ContentBlock::Heading(heading_label(mode).to_string()));
        blocks.extend(body);
    }
    blocks
}
