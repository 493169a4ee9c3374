//! Input adapters: turn a file on disk into a [`Document`].
//!
//! Two formats are understood:
//!
//! * `.json` — a serialised [`Document`] (see [`crate::model`]).
//! * `.org`  — a small, line-oriented subset of Org mode: `#+TITLE`,
//!   `*` headings, paragraphs, `-`/`+`/`1.` lists with nesting,
//!   `#+BEGIN_SRC`/`#+BEGIN_EXAMPLE` blocks, `-----` rules and standalone
//!   `[[file:…]]` images, with `*bold*`, `/italic/`, `=verbatim=`, `~code~`
//!   and `[[link][description]]` inline markup.
//!
//! Images are probed on disk for their intrinsic size so the measurer can
//! size them; an image that cannot be read keeps an unknown aspect ratio.
//! The document title comes from `#+TITLE` (JSON: the `title` field) and
//! falls back to the file stem.

use crate::error::CardError;
use crate::model::{Block, BlockKind, Document, Inline, InlineStyle, ListStyle};
use crate::pipeline::normalize::{clean_source, collapse_whitespace};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Malformed Org source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {detail}")]
pub struct OrgParseError {
    /// 1-based.
    pub line: usize,
    pub detail: String,
}

/// Read and parse `path` according to its extension.
pub fn load_document(path: impl AsRef<Path>) -> Result<Document, CardError> {
    let path = path.as_ref();
    let text = read_source(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut doc = match ext.as_str() {
        "json" => serde_json::from_str::<Document>(&text).map_err(|e| CardError::InputParse {
            path: path.to_path_buf(),
            line: Some(e.line()),
            detail: e.to_string(),
        })?,
        "org" => parse_org(&text, path.parent()).map_err(|e| CardError::InputParse {
            path: path.to_path_buf(),
            line: Some(e.line),
            detail: e.detail,
        })?,
        other => {
            return Err(CardError::InputParse {
                path: path.to_path_buf(),
                line: None,
                detail: format!("unsupported input format '.{other}' (expected .org or .json)"),
            })
        }
    };

    if doc.title.is_none() && !stem.is_empty() {
        doc.title = Some(stem);
    }
    doc.source = Some(path.display().to_string());
    info!("Loaded {}: {} blocks", path.display(), doc.len());
    Ok(doc)
}

fn read_source(path: &Path) -> Result<String, CardError> {
    if !path.exists() {
        return Err(CardError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes).map_err(|e| CardError::InputParse {
            path: path.to_path_buf(),
            line: None,
            detail: format!("not valid UTF-8: {e}"),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(CardError::PermissionDenied {
            path: path.to_path_buf(),
        }),
        Err(_) => Err(CardError::InputNotFound {
            path: path.to_path_buf(),
        }),
    }
}

// ── Org parsing ──────────────────────────────────────────────────────────────

static RE_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^#\+([A-Z_]+):\s*(.*)$").unwrap());
static RE_BEGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*#\+BEGIN_([A-Z]+)(?:\s+(\S+))?").unwrap());
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\*+)\s+(.*?)(?:\s+:[\w@:]+:)?\s*$").unwrap());
static RE_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)([-+]|(\d+)[.)])\s+(.*)$").unwrap());
static RE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-{5,}\s*$").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\[\[(?:file:)?([^\]]+\.(?:png|jpe?g|gif|webp|bmp))\](?:\[([^\]]*)\])?\]\s*$").unwrap()
});

/// Block currently being accumulated from several lines.
enum Open {
    Paragraph(Vec<String>),
    Item {
        style: ListStyle,
        depth: u8,
        ordinal: Option<u32>,
        indent: usize,
        lines: Vec<String>,
    },
}

/// Parse Org source. `base_dir` resolves relative image paths.
pub fn parse_org(source: &str, base_dir: Option<&Path>) -> Result<Document, OrgParseError> {
    let text = clean_source(source);
    let lines: Vec<&str> = text.lines().collect();
    let mut doc = Document::new();
    let mut open: Option<Open> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush(&mut doc, open.take());
            i += 1;
            continue;
        }

        // Source / example blocks
        if let Some(caps) = RE_BEGIN.captures(line) {
            flush(&mut doc, open.take());
            let kind = caps[1].to_uppercase();
            let language = caps.get(2).map(|m| m.as_str().to_string());
            let end_marker = format!("#+END_{kind}");
            let start = i;
            let end = lines[i + 1..]
                .iter()
                .position(|l| l.trim().to_uppercase().starts_with(&end_marker))
                .map(|offset| i + 1 + offset)
                .ok_or_else(|| OrgParseError {
                    line: start + 1,
                    detail: format!("#+BEGIN_{kind} without matching {end_marker}"),
                })?;
            let body = &lines[start + 1..end];
            match kind.as_str() {
                "SRC" | "EXAMPLE" => {
                    let code = dedent(body);
                    let lang = if kind == "SRC" { language.as_deref() } else { None };
                    doc.push(Block::code(lang, code));
                }
                // Other blocks (quote, center, …) keep their content as paragraphs.
                _ => {
                    let inner = parse_org(&body.join("\n"), base_dir)
                        .map_err(|e| OrgParseError {
                            line: start + 1 + e.line,
                            detail: e.detail,
                        })?;
                    doc.blocks.extend(inner.blocks);
                }
            }
            i = end + 1;
            continue;
        }

        // Keywords and stray directives
        if trimmed.starts_with("#+") {
            if let Some(caps) = RE_KEYWORD.captures(trimmed) {
                let title = collapse_whitespace(&caps[2]);
                if caps[1].eq_ignore_ascii_case("TITLE") && !title.is_empty() {
                    doc.title = Some(title);
                }
            }
            i += 1;
            continue;
        }

        // Comments
        if trimmed == "#" || trimmed.starts_with("# ") {
            i += 1;
            continue;
        }

        if let Some(caps) = RE_HEADING.captures(line) {
            flush(&mut doc, open.take());
            let level = caps[1].len().min(6) as u8;
            doc.push(inline_block(BlockKind::Heading { level }, &caps[2]));
            i += 1;
            continue;
        }

        if RE_RULE.is_match(line) {
            flush(&mut doc, open.take());
            doc.push(Block::divider());
            i += 1;
            continue;
        }

        if let Some(caps) = RE_IMAGE.captures(line) {
            flush(&mut doc, open.take());
            let src = caps[1].to_string();
            let alt = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let ratio = probe_aspect_ratio(&src, base_dir);
            doc.push(Block::image(src, alt, ratio));
            i += 1;
            continue;
        }

        if let Some(caps) = RE_LIST.captures(line) {
            flush(&mut doc, open.take());
            let indent = caps[1].chars().count();
            let ordinal = caps.get(3).and_then(|m| m.as_str().parse().ok());
            open = Some(Open::Item {
                style: if ordinal.is_some() {
                    ListStyle::Ordered
                } else {
                    ListStyle::Unordered
                },
                depth: (indent / 2).min(u8::MAX as usize) as u8,
                ordinal,
                indent,
                lines: vec![caps[4].to_string()],
            });
            i += 1;
            continue;
        }

        // Continuation text
        let indent = line.len() - line.trim_start().len();
        let continued = match &mut open {
            Some(Open::Item {
                indent: item_indent,
                lines,
                ..
            }) if indent > *item_indent => {
                lines.push(trimmed.to_string());
                true
            }
            Some(Open::Paragraph(lines)) => {
                lines.push(trimmed.to_string());
                true
            }
            _ => false,
        };
        if !continued {
            flush(&mut doc, open.take());
            open = Some(Open::Paragraph(vec![trimmed.to_string()]));
        }
        i += 1;
    }
    flush(&mut doc, open.take());

    // The title opens the first card.
    if let Some(title) = doc.title.clone() {
        doc.blocks.insert(0, Arc::new(inline_block(BlockKind::Heading { level: 1 }, &title)));
    }
    debug!("Parsed org source: {} blocks", doc.len());
    Ok(doc)
}

fn flush(doc: &mut Document, open: Option<Open>) {
    match open {
        None => {}
        Some(Open::Paragraph(lines)) => doc.push(inline_block(BlockKind::Paragraph, &lines.join(" "))),
        Some(Open::Item {
            style,
            depth,
            ordinal,
            lines,
            ..
        }) => doc.push(inline_block(
            BlockKind::ListItem {
                style,
                depth,
                ordinal,
            },
            &lines.join(" "),
        )),
    }
}

/// Build a text block from Org inline markup. Kinds produced here always
/// validate.
fn inline_block(kind: BlockKind, text: &str) -> Block {
    let spans = parse_inline(&collapse_whitespace(text));
    match Block::with_spans(kind, spans) {
        Ok(block) => block,
        Err(_) => Block::paragraph(text),
    }
}

/// Remove the indentation shared by all non-blank lines and Org's `,`
/// escapes in front of `*` and `#+`.
fn dedent(lines: &[&str]) -> String {
    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| {
            let l = l.get(common..).unwrap_or("");
            match l.strip_prefix(',') {
                Some(rest) if rest.starts_with('*') || rest.starts_with("#+") => rest,
                _ => l,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn probe_aspect_ratio(src: &str, base_dir: Option<&Path>) -> Option<f32> {
    let path = match base_dir {
        Some(dir) if Path::new(src).is_relative() => dir.join(src),
        _ => PathBuf::from(src),
    };
    match image::image_dimensions(&path) {
        Ok((w, h)) if w > 0 && h > 0 => Some(w as f32 / h as f32),
        Ok(_) => None,
        Err(e) => {
            debug!("Cannot probe image {}: {}", path.display(), e);
            None
        }
    }
}

// ── Inline markup ────────────────────────────────────────────────────────────

static RE_INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\[\[(?P<href>[^\]]+)\](?:\[(?P<desc>[^\]]+)\])?\]",
        r"|\*(?P<b>[^\s*][^*]*?)\*",
        r"|/(?P<i>[^\s/][^/]*?)/",
        r"|=(?P<v>[^\s=][^=]*?)=",
        r"|~(?P<c>[^\s~][^~]*?)~",
    ))
    .unwrap()
});

/// Emphasis markers only count at word edges, so `a/b/c` and `2*3*4` stay
/// plain.
fn at_word_edges(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let pre_ok = before.map_or(true, |c| c.is_whitespace() || "([{\"'-".contains(c));
    let post_ok = after.map_or(true, |c| c.is_whitespace() || ".,;:!?)]}\"'-".contains(c));
    pre_ok && post_ok
}

fn parse_inline(text: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut plain = String::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = RE_INLINE.captures_at(text, pos) else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };

        let styled = if let Some(href) = caps.name("href") {
            let label = caps.name("desc").unwrap_or(href).as_str();
            Some((label, InlineStyle::Link {
                href: href.as_str().to_string(),
            }))
        } else if !at_word_edges(text, whole.start(), whole.end()) {
            None
        } else {
            [
                ("b", InlineStyle::Strong),
                ("i", InlineStyle::Emphasis),
                ("v", InlineStyle::Code),
                ("c", InlineStyle::Code),
            ]
            .into_iter()
            .find_map(|(group, style)| caps.name(group).map(|m| (m.as_str(), style)))
            .filter(|(inner, _)| !inner.ends_with(char::is_whitespace))
        };

        match styled {
            Some((inner, style)) => {
                plain.push_str(&text[pos..whole.start()]);
                if !plain.is_empty() {
                    spans.push(Inline::plain(std::mem::take(&mut plain)));
                }
                spans.push(Inline::styled(inner, style));
                pos = whole.end();
            }
            None => {
                // Not markup: keep the marker character and search past it.
                let step = text[whole.start()..].chars().next().map_or(1, char::len_utf8);
                plain.push_str(&text[pos..whole.start() + step]);
                pos = whole.start() + step;
            }
        }
    }
    plain.push_str(&text[pos..]);
    if !plain.is_empty() {
        spans.push(Inline::plain(plain));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "#+TITLE: Weekend  reading
#+AUTHOR: someone
# a comment

* Why it matters :tag:
First line of a
paragraph with *bold* text.

- one
  continued
  - nested
2. second

-----
#+BEGIN_SRC rust
fn main() {
,* not a heading
}
#+END_SRC
";

    #[test]
    fn parses_the_block_structure() {
        let doc = parse_org(SAMPLE, None).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Weekend reading"));
        let kinds: Vec<&str> = doc.blocks.iter().map(|b| b.kind().name()).collect();
        assert_eq!(
            kinds,
            vec![
                "heading",
                "heading",
                "paragraph",
                "list item",
                "list item",
                "list item",
                "divider",
                "code block"
            ]
        );
        assert_eq!(doc.blocks[0].kind(), &BlockKind::Heading { level: 1 });
        assert_eq!(doc.blocks[0].text(), "Weekend reading");
        assert_eq!(doc.blocks[1].text(), "Why it matters");
        assert_eq!(doc.blocks[2].text(), "First line of a paragraph with bold text.");
        assert_eq!(doc.blocks[3].text(), "one continued");
        assert_eq!(
            doc.blocks[4].kind(),
            &BlockKind::ListItem {
                style: ListStyle::Unordered,
                depth: 1,
                ordinal: None
            }
        );
        assert_eq!(
            doc.blocks[5].kind(),
            &BlockKind::ListItem {
                style: ListStyle::Ordered,
                depth: 0,
                ordinal: Some(2)
            }
        );
        assert_eq!(doc.blocks[7].text(), "fn main() {\n* not a heading\n}");
        assert_eq!(
            doc.blocks[7].kind(),
            &BlockKind::CodeBlock {
                language: Some("rust".into())
            }
        );
    }

    #[test]
    fn inline_markup_becomes_styled_spans() {
        let spans = parse_inline("see *this* and /that/ or =x= via [[https://a.b][site]].");
        assert_eq!(
            spans,
            vec![
                Inline::plain("see "),
                Inline::styled("this", InlineStyle::Strong),
                Inline::plain(" and "),
                Inline::styled("that", InlineStyle::Emphasis),
                Inline::plain(" or "),
                Inline::styled("x", InlineStyle::Code),
                Inline::plain(" via "),
                Inline::styled(
                    "site",
                    InlineStyle::Link {
                        href: "https://a.b".into()
                    }
                ),
                Inline::plain("."),
            ]
        );
    }

    #[test]
    fn markers_inside_words_stay_plain() {
        assert_eq!(parse_inline("a/b/c and 2*3*4"), vec![Inline::plain("a/b/c and 2*3*4")]);
    }

    #[test]
    fn unterminated_source_block_reports_its_line() {
        let err = parse_org("para\n\n#+BEGIN_SRC sh\necho hi\n", None).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.detail.contains("#+END_SRC"));
    }

    #[test]
    fn standalone_image_is_probed_for_its_size() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbaImage::new(300, 200).save(dir.path().join("chart.png")).unwrap();
        let doc = parse_org("[[file:chart.png]]\n\n[[./missing.png][lost]]\n", Some(dir.path())).unwrap();
        assert_eq!(
            doc.blocks[0].kind(),
            &BlockKind::Image {
                source: "chart.png".into(),
                aspect_ratio: Some(1.5)
            }
        );
        assert_eq!(
            doc.blocks[1].kind(),
            &BlockKind::Image {
                source: "./missing.png".into(),
                aspect_ratio: None
            }
        );
        assert_eq!(doc.blocks[1].text(), "lost");
    }

    #[test]
    fn load_document_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my-notes.org");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"Just a paragraph.\r\n")
            .unwrap();
        let doc = load_document(&path).unwrap();
        assert_eq!(doc.title.as_deref(), Some("my-notes"));
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.source.as_deref(), Some(path.display().to_string().as_str()));
    }

    #[test]
    fn load_document_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, r#"{"title":"T","blocks":[{"type":"paragraph","text":"hi"}]}"#).unwrap();
        let doc = load_document(&path).unwrap();
        assert_eq!(doc.title.as_deref(), Some("T"));
        assert_eq!(doc.blocks[0].text(), "hi");
    }

    #[test]
    fn load_document_errors() {
        let err = load_document("/definitely/not/here.org").unwrap_err();
        assert!(matches!(err, CardError::InputNotFound { .. }));

        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("doc.json");
        std::fs::write(&bad, "{\n  \"blocks\": [oops]\n}").unwrap();
        match load_document(&bad).unwrap_err() {
            CardError::InputParse { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("unexpected {other:?}"),
        }

        let txt = dir.path().join("doc.txt");
        std::fs::write(&txt, "x").unwrap();
        assert!(matches!(load_document(&txt).unwrap_err(), CardError::InputParse { line: None, .. }));
    }
}
