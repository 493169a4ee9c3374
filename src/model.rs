//! Block model: the immutable, typed form of a parsed document.
//!
//! A [`Document`] is an ordered list of [`Block`]s. Each block has a closed
//! [`BlockKind`], a list of inline spans, and two layout flags derived from
//! its kind at construction time:
//!
//! * `splittable` — the block may break across pages at a content-unit
//!   boundary (long paragraphs, multi-line code blocks).
//! * `keep_with_next` — the block should not end a page on its own
//!   (headings).
//!
//! ## Content units
//!
//! Splittable blocks are addressed by *content units* rather than bytes so
//! that the measurer and the renderer agree on where a fragment starts and
//! ends. Paragraph text is segmented into whitespace-separated words, with
//! each wide glyph (CJK, emoji) forming its own unit because such scripts
//! wrap between any two glyphs. Code blocks use one unit per source line.
//! A [`ContentRange`] of units always maps back to an exact slice of the
//! block text.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Paragraphs with more content units than this may split across pages.
///
/// Shorter paragraphs are kept whole: a two-line paragraph broken over a
/// card boundary reads worse than moving it to the next card.
pub const LONG_PARAGRAPH_UNITS: usize = 24;

/// Rejected block construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
    #[error("heading level must be between 1 and 6, got {0}")]
    HeadingLevel(u8),

    #[error("image aspect ratio must be positive and finite, got {0}")]
    AspectRatio(f32),

    #[error("image source must not be empty")]
    EmptyImageSource,
}

/// Ordered or bulleted list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    Ordered,
    Unordered,
}

/// The semantic type of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Heading {
        level: u8,
    },
    Paragraph,
    ListItem {
        style: ListStyle,
        #[serde(default)]
        depth: u8,
        /// Item number for ordered lists, as written in the source.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ordinal: Option<u32>,
    },
    CodeBlock {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Image {
        source: String,
        /// Intrinsic width / height. `None` when the image could not be probed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aspect_ratio: Option<f32>,
    },
    Divider,
}

impl BlockKind {
    /// Short lowercase name used in logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Heading { .. } => "heading",
            BlockKind::Paragraph => "paragraph",
            BlockKind::ListItem { .. } => "list item",
            BlockKind::CodeBlock { .. } => "code block",
            BlockKind::Image { .. } => "image",
            BlockKind::Divider => "divider",
        }
    }
}

/// Inline formatting of a span.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineStyle {
    #[default]
    Plain,
    Strong,
    Emphasis,
    Code,
    Link {
        href: String,
    },
}

impl InlineStyle {
    pub fn is_plain(&self) -> bool {
        matches!(self, InlineStyle::Plain)
    }
}

/// A run of text sharing one inline style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inline {
    pub text: String,
    #[serde(default, skip_serializing_if = "InlineStyle::is_plain")]
    pub style: InlineStyle,
}

impl Inline {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: InlineStyle::Plain,
        }
    }

    pub fn styled(text: impl Into<String>, style: InlineStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// Half-open range of content-unit indices within one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRange {
    pub start: usize,
    pub end: usize,
}

impl ContentRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// An immutable unit of document content.
///
/// Fields are private: kind, spans and the derived layout flags are fixed
/// once the block exists. Use the named constructors or
/// [`Block::with_spans`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BlockSource", into = "BlockSource")]
pub struct Block {
    kind: BlockKind,
    spans: Vec<Inline>,
    text: String,
    units: Vec<Range<usize>>,
    splittable: bool,
    keep_with_next: bool,
}

impl Block {
    /// Validating constructor shared by the input adapters.
    pub fn with_spans(kind: BlockKind, spans: Vec<Inline>) -> Result<Self, BlockError> {
        match &kind {
            BlockKind::Heading { level } if !(1..=6).contains(level) => {
                return Err(BlockError::HeadingLevel(*level));
            }
            BlockKind::Image { source, .. } if source.trim().is_empty() => {
                return Err(BlockError::EmptyImageSource);
            }
            BlockKind::Image {
                aspect_ratio: Some(ratio),
                ..
            } if !(ratio.is_finite() && *ratio > 0.0) => {
                return Err(BlockError::AspectRatio(*ratio));
            }
            _ => {}
        }
        Ok(Self::build(kind, spans))
    }

    /// Heading; `level` is clamped to 1–6.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::build(
            BlockKind::Heading {
                level: level.clamp(1, 6),
            },
            vec![Inline::plain(text)],
        )
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::build(BlockKind::Paragraph, vec![Inline::plain(text)])
    }

    pub fn list_item(style: ListStyle, depth: u8, text: impl Into<String>) -> Self {
        Self::build(
            BlockKind::ListItem {
                style,
                depth,
                ordinal: None,
            },
            vec![Inline::plain(text)],
        )
    }

    pub fn code(language: Option<&str>, source: impl Into<String>) -> Self {
        let mut source = source.into();
        while source.ends_with('\n') {
            source.pop();
        }
        Self::build(
            BlockKind::CodeBlock {
                language: language.map(str::to_string),
            },
            vec![Inline::plain(source)],
        )
    }

    /// Image with optional alt text. A non-positive aspect ratio is treated
    /// as unknown.
    pub fn image(source: impl Into<String>, alt: impl Into<String>, aspect_ratio: Option<f32>) -> Self {
        Self::build(
            BlockKind::Image {
                source: source.into(),
                aspect_ratio: aspect_ratio.filter(|r| r.is_finite() && *r > 0.0),
            },
            vec![Inline::plain(alt)],
        )
    }

    pub fn divider() -> Self {
        Self::build(BlockKind::Divider, Vec::new())
    }

    fn build(kind: BlockKind, spans: Vec<Inline>) -> Self {
        let spans: Vec<Inline> = spans.into_iter().filter(|s| !s.text.is_empty()).collect();
        let text: String = spans.iter().map(|s| s.text.as_str()).collect();
        let units = match &kind {
            BlockKind::CodeBlock { .. } => line_units(&text),
            BlockKind::Image { .. } | BlockKind::Divider => Vec::new(),
            _ => word_units(&text),
        };
        let splittable = match &kind {
            BlockKind::Paragraph => units.len() > LONG_PARAGRAPH_UNITS,
            BlockKind::CodeBlock { .. } => units.len() > 1,
            _ => false,
        };
        let keep_with_next = matches!(kind, BlockKind::Heading { .. });

        Self {
            kind,
            spans,
            text,
            units,
            splittable,
            keep_with_next,
        }
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn spans(&self) -> &[Inline] {
        &self.spans
    }

    /// Concatenated text of all spans (alt text for images).
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_splittable(&self) -> bool {
        self.splittable
    }

    pub fn keep_with_next(&self) -> bool {
        self.keep_with_next
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn full_range(&self) -> ContentRange {
        ContentRange::new(0, self.units.len())
    }

    /// Text of a single content unit.
    pub fn unit_text(&self, index: usize) -> &str {
        self.units
            .get(index)
            .map(|r| &self.text[r.clone()])
            .unwrap_or("")
    }

    /// Whether the source separates unit `index` from the previous one with
    /// whitespace (wide glyphs abut without a gap).
    pub fn gap_before(&self, index: usize) -> bool {
        match (index.checked_sub(1).and_then(|i| self.units.get(i)), self.units.get(index)) {
            (Some(prev), Some(cur)) => prev.end < cur.start,
            _ => false,
        }
    }

    /// Byte span of a unit range within [`Block::text`].
    fn byte_window(&self, range: ContentRange) -> Option<Range<usize>> {
        let end = range.end.min(self.units.len());
        if range.start >= end {
            return None;
        }
        Some(self.units[range.start].start..self.units[end - 1].end)
    }

    /// Exact source text covered by a unit range.
    pub fn slice(&self, range: ContentRange) -> &str {
        match self.byte_window(range) {
            Some(window) => &self.text[window],
            None => "",
        }
    }

    /// Inline spans clipped to a unit range, styles preserved.
    pub fn spans_in(&self, range: ContentRange) -> Vec<Inline> {
        let Some(window) = self.byte_window(range) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut offset = 0;
        for span in &self.spans {
            let span_range = offset..offset + span.text.len();
            offset = span_range.end;
            let start = span_range.start.max(window.start);
            let end = span_range.end.min(window.end);
            if start < end {
                out.push(Inline::styled(
                    &span.text[start - span_range.start..end - span_range.start],
                    span.style.clone(),
                ));
            }
        }
        out
    }
}

/// Serde shape of a block: the tagged kind plus either `text` or `spans`.
#[derive(Serialize, Deserialize)]
struct BlockSource {
    #[serde(flatten)]
    kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    spans: Vec<Inline>,
}

impl TryFrom<BlockSource> for Block {
    type Error = BlockError;

    fn try_from(src: BlockSource) -> Result<Self, Self::Error> {
        let spans = if src.spans.is_empty() {
            src.text.map(|t| vec![Inline::plain(t)]).unwrap_or_default()
        } else {
            src.spans
        };
        Block::with_spans(src.kind, spans)
    }
}

impl From<Block> for BlockSource {
    fn from(block: Block) -> Self {
        Self {
            kind: block.kind,
            text: None,
            spans: block.spans,
        }
    }
}

/// A parsed document: metadata plus the ordered blocks it owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Where the document came from (file path, identifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default)]
    pub blocks: Vec<Arc<Block>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(Arc::new(block));
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl FromIterator<Block> for Document {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().map(Arc::new).collect(),
            ..Self::default()
        }
    }
}

/// Glyphs that occupy a full em and may wrap on either side.
pub(crate) fn is_wide(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{115F}'
        | '\u{2E80}'..='\u{303E}'
        | '\u{3041}'..='\u{33FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{A000}'..='\u{A4CF}'
        | '\u{AC00}'..='\u{D7A3}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FE30}'..='\u{FE4F}'
        | '\u{FF00}'..='\u{FF60}'
        | '\u{FFE0}'..='\u{FFE6}'
        | '\u{1F300}'..='\u{1FAFF}'
        | '\u{20000}'..='\u{3FFFD}')
}

fn word_units(text: &str) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut current: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = current.take() {
                units.push(start..i);
            }
        } else if is_wide(c) {
            if let Some(start) = current.take() {
                units.push(start..i);
            }
            units.push(i..i + c.len_utf8());
        } else if current.is_none() {
            current = Some(i);
        }
    }
    if let Some(start) = current {
        units.push(start..text.len());
    }
    units
}

fn line_units(text: &str) -> Vec<Range<usize>> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut units = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            units.push(start..i);
            start = i + 1;
        }
    }
    units.push(start..text.len());
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_words_are_units() {
        let b = Block::paragraph("  hello   brave\tnew world ");
        assert_eq!(b.unit_count(), 4);
        assert_eq!(b.unit_text(1), "brave");
        assert!(b.gap_before(1));
        assert!(!b.gap_before(0));
    }

    #[test]
    fn wide_glyphs_are_their_own_units() {
        let b = Block::paragraph("读书ok笔记");
        let units: Vec<&str> = (0..b.unit_count()).map(|i| b.unit_text(i)).collect();
        assert_eq!(units, vec!["读", "书", "ok", "笔", "记"]);
        assert!(!b.gap_before(2), "wide glyphs abut without whitespace");
    }

    #[test]
    fn code_units_are_lines_including_blank_ones() {
        let b = Block::code(Some("rust"), "fn main() {\n\n    run();\n}\n");
        assert_eq!(b.unit_count(), 4);
        assert_eq!(b.unit_text(1), "");
        assert_eq!(b.slice(ContentRange::new(2, 4)), "    run();\n}");
        assert!(b.is_splittable());
    }

    #[test]
    fn splittable_and_keep_with_next_follow_kind() {
        assert!(Block::heading(2, "Intro").keep_with_next());
        assert!(!Block::heading(2, "Intro").is_splittable());
        assert!(!Block::paragraph("short paragraph").is_splittable());
        let long = vec!["word"; LONG_PARAGRAPH_UNITS + 1].join(" ");
        assert!(Block::paragraph(long).is_splittable());
        assert!(!Block::code(None, "one line").is_splittable());
        assert!(!Block::list_item(ListStyle::Unordered, 0, "item").is_splittable());
        assert!(!Block::divider().keep_with_next());
    }

    #[test]
    fn heading_level_is_clamped_by_shorthand_and_rejected_by_validator() {
        assert_eq!(Block::heading(9, "x").kind(), &BlockKind::Heading { level: 6 });
        let err = Block::with_spans(BlockKind::Heading { level: 0 }, vec![Inline::plain("x")]);
        assert_eq!(err, Err(BlockError::HeadingLevel(0)));
    }

    #[test]
    fn spans_in_clips_styles_to_the_range() {
        let b = Block::with_spans(
            BlockKind::Paragraph,
            vec![
                Inline::plain("alpha beta "),
                Inline::styled("gamma delta", InlineStyle::Strong),
                Inline::plain(" epsilon"),
            ],
        )
        .unwrap();
        let spans = b.spans_in(ContentRange::new(1, 3));
        assert_eq!(
            spans,
            vec![
                Inline::plain("beta "),
                Inline::styled("gamma", InlineStyle::Strong),
            ]
        );
        assert!(b.spans_in(ContentRange::new(3, 3)).is_empty());
    }

    #[test]
    fn document_deserialises_text_shorthand_and_validates() {
        let json = r#"{
            "title": "Notes",
            "blocks": [
                {"type": "heading", "level": 1, "text": "Notes"},
                {"type": "paragraph", "spans": [{"text": "a "}, {"text": "b", "style": "strong"}]},
                {"type": "image", "source": "cat.png", "aspect_ratio": 1.5},
                {"type": "list_item", "style": "ordered", "depth": 1, "ordinal": 3, "text": "third"},
                {"type": "divider"}
            ]
        }"#;
        let doc: Document = serde_json::from_str(json).expect("valid document");
        assert_eq!(doc.len(), 5);
        assert_eq!(doc.blocks[1].text(), "a b");
        assert!(doc.blocks[0].keep_with_next());

        let bad = r#"{"blocks": [{"type": "heading", "level": 7, "text": "x"}]}"#;
        assert!(serde_json::from_str::<Document>(bad).is_err());
    }

    #[test]
    fn serialised_block_reads_back_identically() {
        let b = Block::image("figure.png", "a chart", Some(0.75));
        let json = serde_json::to_string(&b).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
