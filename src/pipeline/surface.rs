//! Renderable surface: a page of the plan laid out at canvas coordinates.
//!
//! The surface is what a rasterisation backend draws. It is exactly the
//! canvas size and carries, for every entry, the inline spans it shows
//! (sliced to the entry's content range), its box in pixels and the
//! continuation flags a backend uses to draw "continued" markers. Backends
//! never see blocks or measurers.

use crate::config::PageGeometry;
use crate::model::{BlockKind, Inline};
use crate::paginate::{Page, Placement};
use serde::Serialize;

/// One placed entry, in canvas pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceItem {
    /// 1-based document position of the block.
    pub block: usize,
    pub kind: BlockKind,
    pub spans: Vec<Inline>,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Starts mid-block.
    pub continued_from_previous: bool,
    /// Ends mid-block.
    pub continues: bool,
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Surface {
    pub page_num: usize,
    pub total_pages: usize,
    pub width: u32,
    pub height: u32,
    pub geometry: PageGeometry,
    pub items: Vec<SurfaceItem>,
    /// Page-number label drawn in the bottom margin, e.g. `3/7`.
    pub footer: String,
}

/// Lay out `page` on a canvas of `geometry`.
///
/// Items stack from the top margin in entry order; heights are the measured
/// heights from pagination, so the last item ends at `margin_top +
/// page.height`.
pub fn build_surface(page: &Page, total_pages: usize, geometry: &PageGeometry) -> Surface {
    let mut y = geometry.margin_top;
    let items = page
        .entries
        .iter()
        .map(|entry| {
            let (spans, continued_from_previous, continues, placeholder) = match entry.placement {
                Placement::Full => (entry.block.spans().to_vec(), false, false, false),
                Placement::Range(range) => (
                    entry.block.spans_in(range),
                    range.start > 0,
                    range.end < entry.block.unit_count(),
                    false,
                ),
                Placement::Placeholder => (entry.block.spans().to_vec(), false, false, true),
            };
            let item = SurfaceItem {
                block: entry.position + 1,
                kind: entry.block.kind().clone(),
                spans,
                x: geometry.margin_side,
                y,
                width: geometry.content_width(),
                height: entry.height,
                continued_from_previous,
                continues,
                placeholder,
            };
            y += entry.height;
            item
        })
        .collect();

    Surface {
        page_num: page.number,
        total_pages,
        width: geometry.canvas_width,
        height: geometry.canvas_height,
        geometry: *geometry,
        items,
        footer: format!("{}/{}", page.number, total_pages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, ContentRange};
    use crate::paginate::PageEntry;
    use std::sync::Arc;

    #[test]
    fn items_stack_from_the_top_margin() {
        let geometry = PageGeometry::new(600, 800).with_margins(50, 60, 20);
        let heading = Arc::new(Block::heading(1, "Notes"));
        let code = Arc::new(Block::code(None, "a\nb\nc\nd"));
        let page = Page {
            number: 2,
            entries: vec![
                PageEntry {
                    block: heading,
                    position: 3,
                    placement: Placement::Full,
                    height: 100,
                },
                PageEntry {
                    block: code,
                    position: 4,
                    placement: Placement::Range(ContentRange::new(1, 3)),
                    height: 80,
                },
            ],
            height: 180,
        };

        let s = build_surface(&page, 5, &geometry);
        assert_eq!((s.width, s.height), (600, 800));
        assert_eq!(s.footer, "2/5");
        assert_eq!(s.items[0].y, 50);
        assert_eq!(s.items[1].y, 150);
        assert_eq!(s.items[1].x, 20);
        assert_eq!(s.items[1].width, 560);
        assert_eq!(s.items[1].block, 5);
        assert_eq!(s.items[1].spans, vec![Inline::plain("b\nc")]);
        assert!(s.items[1].continued_from_previous);
        assert!(s.items[1].continues);
        assert!(!s.items[0].continues);
    }
}
