//! Caption extraction: a short title + excerpt posted alongside the cards.
//!
//! The caption is derived from the block sequence alone and never looks at
//! pagination, so it is identical whatever the canvas or template.
//!
//! ```text
//! <title>
//!
//! <first paragraphs, whitespace-normalised, joined by spaces>
//! ```
//!
//! The whole caption, title included, is held to a character budget counted
//! in Unicode scalar values. Over-budget captions are cut at the last word
//! boundary inside the budget and the ellipsis marker is appended.

use crate::model::{is_wide, BlockKind, Document};
use crate::pipeline::normalize::collapse_whitespace;
use serde::{Deserialize, Serialize};

/// Caption extraction rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Maximum caption length in characters, excluding the ellipsis.
    pub char_budget: usize,
    /// Number of leading paragraphs that feed the excerpt.
    pub max_paragraphs: usize,
    /// Title used when the document has neither a heading nor a title.
    pub fallback_title: String,
    /// Appended when the caption is cut.
    pub ellipsis: String,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            char_budget: 200,
            max_paragraphs: 3,
            fallback_title: "Untitled".to_string(),
            ellipsis: "…".to_string(),
        }
    }
}

/// Derive the caption for `doc`.
pub fn extract(doc: &Document, config: &CaptionConfig) -> String {
    let title = title(doc, config);

    let excerpt = doc
        .blocks
        .iter()
        .filter(|b| matches!(b.kind(), BlockKind::Paragraph))
        .map(|b| collapse_whitespace(b.text()))
        .filter(|t| !t.is_empty())
        .take(config.max_paragraphs)
        .collect::<Vec<_>>()
        .join(" ");

    let caption = if excerpt.is_empty() {
        title
    } else {
        format!("{title}\n\n{excerpt}")
    };

    if caption.chars().count() <= config.char_budget {
        return caption;
    }
    let mut cut = truncate_at_boundary(&caption, config.char_budget).to_string();
    cut.push_str(&config.ellipsis);
    cut
}

/// The caption's title line: first non-blank heading, else the document
/// title, else the configured fallback. Never cut.
pub fn title(doc: &Document, config: &CaptionConfig) -> String {
    title_of(doc).unwrap_or_else(|| collapse_whitespace(&config.fallback_title))
}

fn title_of(doc: &Document) -> Option<String> {
    doc.blocks
        .iter()
        .filter(|b| matches!(b.kind(), BlockKind::Heading { .. }))
        .map(|b| collapse_whitespace(b.text()))
        .find(|t| !t.is_empty())
        .or_else(|| {
            doc.title
                .as_deref()
                .map(collapse_whitespace)
                .filter(|t| !t.is_empty())
        })
}

/// Longest prefix of at most `budget` chars that ends on a word boundary.
///
/// A boundary is whitespace or either side of a wide glyph, since CJK text
/// breaks between any two glyphs. Falls back to a hard cut when the window
/// holds no boundary at all.
fn truncate_at_boundary(text: &str, budget: usize) -> &str {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    if chars.len() <= budget {
        return text;
    }
    let hard = chars[budget].0;

    let mut cut = None;
    for i in (1..=budget).rev() {
        let (byte, c) = chars[i];
        let prev = chars[i - 1].1;
        if c.is_whitespace() || is_wide(c) || is_wide(prev) {
            cut = Some(byte);
            break;
        }
    }

    match cut.map(|b| text[..b].trim_end()) {
        Some(prefix) if !prefix.is_empty() => prefix,
        _ => text[..hard].trim_end(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Block;

    fn budget(n: usize) -> CaptionConfig {
        CaptionConfig {
            char_budget: n,
            ..CaptionConfig::default()
        }
    }

    #[test]
    fn title_and_excerpt_from_blocks() {
        let doc: Document = [
            Block::heading(1, "Reading  notes"),
            Block::paragraph("First\nparagraph."),
            Block::list_item(crate::model::ListStyle::Unordered, 0, "skipped"),
            Block::paragraph("Second one."),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            extract(&doc, &CaptionConfig::default()),
            "Reading notes\n\nFirst paragraph. Second one."
        );
    }

    #[test]
    fn falls_back_to_document_title_then_config() {
        let doc: Document = [Block::paragraph("Body.")].into_iter().collect();
        assert_eq!(extract(&doc, &CaptionConfig::default()), "Untitled\n\nBody.");
        let doc = doc.with_title("Doc title");
        assert_eq!(extract(&doc, &CaptionConfig::default()), "Doc title\n\nBody.");
    }

    #[test]
    fn only_first_paragraphs_feed_the_excerpt() {
        let doc: Document = (1..=5)
            .map(|i| Block::paragraph(format!("p{i}")))
            .collect::<Document>()
            .with_title("T");
        let cfg = CaptionConfig {
            max_paragraphs: 2,
            ..CaptionConfig::default()
        };
        assert_eq!(extract(&doc, &cfg), "T\n\np1 p2");
    }

    #[test]
    fn title_only_caption_has_no_separator() {
        let doc: Document = [Block::heading(2, "Just a heading")].into_iter().collect();
        assert_eq!(extract(&doc, &CaptionConfig::default()), "Just a heading");
    }

    #[test]
    fn cuts_at_word_boundary_and_appends_ellipsis() {
        let doc: Document = [Block::heading(1, "Title"), Block::paragraph("alpha beta gamma delta")]
            .into_iter()
            .collect();
        // "Title\n\nalpha beta gamma" is 23 chars; a budget of 20 lands inside "gamma".
        assert_eq!(extract(&doc, &budget(20)), "Title\n\nalpha beta…");
    }

    #[test]
    fn exact_budget_is_not_cut() {
        let doc: Document = [Block::heading(1, "abc"), Block::paragraph("de")].into_iter().collect();
        assert_eq!(extract(&doc, &budget(7)), "abc\n\nde");
    }

    #[test]
    fn cjk_text_cuts_between_glyphs() {
        let doc: Document = [Block::heading(1, "读书笔记"), Block::paragraph("今天读了一本很好的书")]
            .into_iter()
            .collect();
        let caption = extract(&doc, &budget(10));
        assert_eq!(caption, "读书笔记\n\n今天读了…");
    }

    #[test]
    fn long_unbroken_title_is_hard_cut() {
        let doc = Document::new().with_title("x".repeat(50));
        let caption = extract(&doc, &budget(10));
        assert_eq!(caption, format!("{}…", "x".repeat(10)));
    }

    #[test]
    fn length_never_exceeds_budget_plus_ellipsis() {
        let text = "lorem ipsum dolor sit amet consectetur adipiscing elit ".repeat(20);
        let doc: Document = [Block::heading(1, "A title"), Block::paragraph(text)]
            .into_iter()
            .collect();
        for n in [1, 5, 17, 64, 200] {
            let c = extract(&doc, &budget(n));
            assert!(c.chars().count() <= n + 1, "budget {n}: {c:?}");
        }
    }
}
