//! Measurement adapter: how tall a block renders at a given width.
//!
//! The pagination engine never inspects block content itself; it asks a
//! [`Measurer`]. Two calls make up the contract:
//!
//! * [`Measurer::measure`] — total height of a block.
//! * [`Measurer::measure_from`] — for splittable blocks, how much of the
//!   block starting at a content-unit offset fits in `max_height`, and
//!   where the next fragment resumes.
//!
//! Implementations must be pure: the same block, context and arguments
//! always produce the same answer, otherwise pagination is not
//! reproducible. Fragments measured from offset 0 to the end must sum to
//! exactly [`Measurer::measure`].
//!
//! [`MetricsMeasurer`] is the built-in, deterministic implementation. It
//! estimates text wrapping from average glyph widths in [`StyleContext`],
//! which is enough for cards with predictable typography and keeps tests
//! free of any rendering backend. A browser-backed measurer plugs in behind
//! the same trait.

use crate::config::PageGeometry;
use crate::model::{is_wide, Block, BlockKind};
use crate::templates::Template;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typographic metrics that constrain measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleContext {
    /// Paragraph and list font size.
    pub body_font_px: f32,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    /// Font-size multipliers for heading levels 1–6.
    pub heading_scale: [f32; 6],
    pub code_font_px: f32,
    pub code_line_height: f32,
    /// Vertical padding above and below a code block, also used as its
    /// horizontal inset.
    pub code_padding_px: u32,
    /// Space after every block.
    pub block_gap_px: u32,
    /// Indent per list depth level (the first level is indented too).
    pub list_indent_px: u32,
    pub divider_px: u32,
    /// Average advance of a narrow glyph as a fraction of the font size.
    /// Wide glyphs (CJK, emoji) advance a full em.
    pub glyph_width_ratio: f32,
}

impl Default for StyleContext {
    fn default() -> Self {
        Template::default().style()
    }
}

/// Everything a measurement depends on besides the block.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureContext {
    /// Width of the content area in pixels.
    pub available_width: u32,
    pub style: StyleContext,
}

impl MeasureContext {
    pub fn new(geometry: &PageGeometry, style: StyleContext) -> Self {
        Self {
            available_width: geometry.content_width(),
            style,
        }
    }
}

/// The backend could not size a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    #[error("measurement unavailable: {0}")]
    Unavailable(String),
}

/// Result of measuring part of a splittable block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Pixels consumed by the units that fit. Zero when nothing fit.
    pub height: u32,
    /// Offset of the first unit that did not fit; `None` when the block is
    /// exhausted.
    pub next: Option<usize>,
}

/// Sizes blocks for the pagination engine.
///
/// `Send + Sync` so a measurer can be shared with the blocking worker that
/// runs pagination.
pub trait Measurer: Send + Sync {
    /// Total rendered height of `block`, including the gap after it.
    fn measure(&self, block: &Block, ctx: &MeasureContext) -> Result<u32, MeasureError>;

    /// Measure `block` from unit `offset` against `max_height`.
    ///
    /// When `at_page_top` is set the fragment starts an empty page and the
    /// implementation must consume at least one unit, even if that unit
    /// alone is taller than `max_height`.
    fn measure_from(
        &self,
        block: &Block,
        offset: usize,
        ctx: &MeasureContext,
        max_height: u32,
        at_page_top: bool,
    ) -> Result<Fragment, MeasureError>;
}

/// Deterministic text-metrics measurer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMeasurer;

/// One wrapped line (or code row group) ending before unit `end`.
#[derive(Debug, Clone, Copy)]
struct Line {
    end: usize,
    height: u32,
}

/// Wrapped layout of a block from some offset.
struct Frame {
    /// Space above the first line; only present when starting at offset 0.
    lead: u32,
    /// Space below the last line, including the block gap.
    tail: u32,
    lines: Vec<Line>,
}

impl MetricsMeasurer {
    fn frame(&self, block: &Block, ctx: &MeasureContext, from: usize) -> Frame {
        let style = &ctx.style;
        let width = ctx.available_width as f32;
        let gap = style.block_gap_px;

        match block.kind() {
            BlockKind::Heading { level } => {
                let scale = style.heading_scale[(*level).clamp(1, 6) as usize - 1];
                let font = style.body_font_px * scale;
                Frame {
                    lead: 0,
                    tail: gap,
                    lines: wrap_words(block, from, font, style.line_height, width, style),
                }
            }
            BlockKind::Paragraph => Frame {
                lead: 0,
                tail: gap,
                lines: wrap_words(block, from, style.body_font_px, style.line_height, width, style),
            },
            BlockKind::ListItem { depth, .. } => {
                let indent = style.list_indent_px as f32 * (*depth as f32 + 1.0);
                Frame {
                    lead: 0,
                    tail: gap,
                    lines: wrap_words(
                        block,
                        from,
                        style.body_font_px,
                        style.line_height,
                        width - indent,
                        style,
                    ),
                }
            }
            BlockKind::CodeBlock { .. } => {
                let pad = style.code_padding_px;
                let inner = width - 2.0 * pad as f32;
                Frame {
                    lead: if from == 0 { pad } else { 0 },
                    tail: pad + gap,
                    lines: wrap_code(block, from, inner, style),
                }
            }
            BlockKind::Image { .. } | BlockKind::Divider => Frame {
                lead: 0,
                tail: 0,
                lines: Vec::new(),
            },
        }
    }
}

impl Measurer for MetricsMeasurer {
    fn measure(&self, block: &Block, ctx: &MeasureContext) -> Result<u32, MeasureError> {
        let style = &ctx.style;
        match block.kind() {
            BlockKind::Image {
                source,
                aspect_ratio,
            } => {
                let ratio = aspect_ratio.ok_or_else(|| {
                    MeasureError::Unavailable(format!("image '{source}' has no intrinsic size"))
                })?;
                let height = (ctx.available_width as f32 / ratio).round() as u32;
                Ok(height + style.block_gap_px)
            }
            BlockKind::Divider => Ok(style.divider_px + style.block_gap_px),
            _ => {
                let frame = self.frame(block, ctx, 0);
                let body: u32 = frame.lines.iter().map(|l| l.height).sum();
                Ok(frame.lead + body + frame.tail)
            }
        }
    }

    fn measure_from(
        &self,
        block: &Block,
        offset: usize,
        ctx: &MeasureContext,
        max_height: u32,
        at_page_top: bool,
    ) -> Result<Fragment, MeasureError> {
        let units = block.unit_count();
        if units == 0 {
            // Nothing to split: all or nothing.
            let height = self.measure(block, ctx)?;
            return Ok(if height <= max_height || at_page_top {
                Fragment { height, next: None }
            } else {
                Fragment {
                    height: 0,
                    next: Some(offset),
                }
            });
        }
        if offset >= units {
            return Ok(Fragment {
                height: 0,
                next: None,
            });
        }

        let frame = self.frame(block, ctx, offset);
        let mut used = frame.lead;
        let mut end = offset;
        let mut took = false;
        let count = frame.lines.len();

        for (i, line) in frame.lines.iter().enumerate() {
            let cost = line.height + if i + 1 == count { frame.tail } else { 0 };
            if used + cost <= max_height || (!took && at_page_top) {
                used += cost;
                end = line.end;
                took = true;
                if used > max_height {
                    break;
                }
            } else {
                break;
            }
        }

        if !took {
            return Ok(Fragment {
                height: 0,
                next: Some(offset),
            });
        }
        Ok(Fragment {
            height: used,
            next: (end < units).then_some(end),
        })
    }
}

fn glyph_width(c: char, font: f32, ratio: f32) -> f32 {
    if c == '\t' {
        4.0 * font * ratio
    } else if is_wide(c) {
        font
    } else {
        font * ratio
    }
}

fn text_width(s: &str, font: f32, ratio: f32) -> f32 {
    s.chars().map(|c| glyph_width(c, font, ratio)).sum()
}

/// Greedy word wrap over content units. A unit wider than the line gets
/// rows of its own.
fn wrap_words(
    block: &Block,
    from: usize,
    font: f32,
    line_height: f32,
    width: f32,
    style: &StyleContext,
) -> Vec<Line> {
    let units = block.unit_count();
    let line_px = (font * line_height).round() as u32;
    let width = width.max(1.0);
    let space = font * style.glyph_width_ratio;

    let mut lines = Vec::new();
    let mut filled = 0.0f32;
    let mut open = false;

    for i in from..units {
        let w = text_width(block.unit_text(i), font, style.glyph_width_ratio);
        let gap = if open && block.gap_before(i) { space } else { 0.0 };

        if open && filled + gap + w > width {
            lines.push(Line {
                end: i,
                height: line_px,
            });
            open = false;
        }

        if open {
            filled += gap + w;
        } else if w > width {
            let rows = (w / width).ceil().max(1.0) as u32;
            lines.push(Line {
                end: i + 1,
                height: line_px * rows,
            });
        } else {
            filled = w;
            open = true;
        }
    }
    if open {
        lines.push(Line {
            end: units,
            height: line_px,
        });
    }
    lines
}

/// One line group per source line; long lines wrap onto extra rows.
fn wrap_code(block: &Block, from: usize, width: f32, style: &StyleContext) -> Vec<Line> {
    let line_px = (style.code_font_px * style.code_line_height).round() as u32;
    let width = width.max(1.0);
    (from..block.unit_count())
        .map(|i| {
            let w = text_width(block.unit_text(i), style.code_font_px, style.glyph_width_ratio);
            let rows = (w / width).ceil().max(1.0) as u32;
            Line {
                end: i + 1,
                height: line_px * rows,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ListStyle;

    fn ctx() -> MeasureContext {
        MeasureContext {
            available_width: 1000,
            style: StyleContext {
                body_font_px: 20.0,
                line_height: 1.5,
                heading_scale: [2.0, 1.5, 1.25, 1.0, 1.0, 1.0],
                code_font_px: 20.0,
                code_line_height: 1.0,
                code_padding_px: 10,
                block_gap_px: 10,
                list_indent_px: 50,
                divider_px: 2,
                glyph_width_ratio: 0.5,
            },
        }
    }

    /// Measure every fragment of `block` at a fixed page capacity.
    fn fragments(block: &Block, capacity: u32) -> Vec<(usize, Fragment)> {
        let m = MetricsMeasurer;
        let ctx = ctx();
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let f = m.measure_from(block, offset, &ctx, capacity, true).unwrap();
            out.push((offset, f));
            match f.next {
                Some(n) => offset = n,
                None => break,
            }
        }
        out
    }

    #[test]
    fn single_line_paragraph_height() {
        // 20px font × 1.5 = 30px line, plus 10px gap.
        let h = MetricsMeasurer.measure(&Block::paragraph("short text"), &ctx()).unwrap();
        assert_eq!(h, 40);
    }

    #[test]
    fn wide_glyphs_wrap_sooner_than_latin() {
        // 1000px / 20px per glyph = 50 wide glyphs per line.
        let cjk = Block::paragraph("字".repeat(120));
        let h = MetricsMeasurer.measure(&cjk, &ctx()).unwrap();
        assert_eq!(h, 3 * 30 + 10);
        // Same count of narrow glyphs (10px each) fits in two lines.
        let latin = Block::paragraph("a".repeat(120));
        assert_eq!(MetricsMeasurer.measure(&latin, &ctx()).unwrap(), 2 * 30 + 10);
    }

    #[test]
    fn fragments_sum_to_measured_height() {
        let words = (0..400).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let block = Block::paragraph(words);
        let total = MetricsMeasurer.measure(&block, &ctx()).unwrap();
        let frags = fragments(&block, 95);
        assert!(frags.len() > 2);
        let sum: u32 = frags.iter().map(|(_, f)| f.height).sum();
        assert_eq!(sum, total);
        assert!(frags.iter().all(|(_, f)| f.height <= 95));
    }

    #[test]
    fn code_fragments_carry_padding_at_the_ends() {
        let block = Block::code(None, (0..10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n"));
        let total = MetricsMeasurer.measure(&block, &ctx()).unwrap();
        // 10 pad + 10 × 20 + 10 pad + 10 gap
        assert_eq!(total, 230);
        let frags = fragments(&block, 100);
        let sum: u32 = frags.iter().map(|(_, f)| f.height).sum();
        assert_eq!(sum, total);
        assert_eq!(frags[0].1, Fragment { height: 90, next: Some(4) });
    }

    #[test]
    fn nothing_fits_without_page_top_returns_zero_progress() {
        let block = Block::code(None, "a\nb\nc");
        let f = MetricsMeasurer.measure_from(&block, 1, &ctx(), 5, false).unwrap();
        assert_eq!(f, Fragment { height: 0, next: Some(1) });
    }

    #[test]
    fn page_top_forces_one_unit_even_when_it_overflows() {
        let block = Block::code(None, "a\nb\nc");
        let f = MetricsMeasurer.measure_from(&block, 0, &ctx(), 5, true).unwrap();
        assert_eq!(f, Fragment { height: 30, next: Some(1) });
    }

    #[test]
    fn list_indent_narrows_the_line() {
        let text = "a".repeat(190); // 1900px of glyphs
        let flat = Block::paragraph(text.clone());
        let nested = Block::list_item(ListStyle::Unordered, 1, text);
        let flat_h = MetricsMeasurer.measure(&flat, &ctx()).unwrap();
        let nested_h = MetricsMeasurer.measure(&nested, &ctx()).unwrap();
        assert_eq!(flat_h, 2 * 30 + 10);
        assert_eq!(nested_h, 3 * 30 + 10);
    }

    #[test]
    fn image_height_follows_aspect_ratio() {
        let img = Block::image("a.png", "", Some(2.0));
        assert_eq!(MetricsMeasurer.measure(&img, &ctx()).unwrap(), 500 + 10);
    }

    #[test]
    fn image_without_size_is_unavailable() {
        let img = Block::image("missing.png", "", None);
        let err = MetricsMeasurer.measure(&img, &ctx()).unwrap_err();
        assert!(err.to_string().contains("missing.png"));
    }

    #[test]
    fn heading_scale_applies() {
        // 20 × 2.0 × 1.5 = 60px line
        let h = MetricsMeasurer.measure(&Block::heading(1, "Title"), &ctx()).unwrap();
        assert_eq!(h, 70);
    }
}
