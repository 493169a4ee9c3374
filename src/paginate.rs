//! Pagination engine: split a block sequence into canvas-sized pages.
//!
//! One greedy forward pass, no backtracking. For every block in document
//! order:
//!
//! * **Atomic** blocks are measured once and placed whole. A block that does
//!   not fit closes the current page and is retried on a fresh one. A block
//!   taller than an empty page is placed alone and reported as
//!   [`Diagnostic::OversizedBlock`].
//! * **Splittable** blocks are laid out fragment by fragment through
//!   [`Measurer::measure_from`], each fragment recorded as a
//!   [`ContentRange`] of content units. A page that ends mid-block is closed
//!   and the next fragment starts a fresh page.
//! * **Keep-with-next** runs (headings) at the end of a page that closes
//!   because the next block does not fit are moved to the next page, as long
//!   as that leaves the page non-empty and the next block can fit below the
//!   run on a fresh page.
//!
//! `h == remaining` fits. Measurements happen strictly one at a time in
//! document order, so the same document, geometry and measurer always yield
//! the same pages.

use crate::config::{ConversionConfig, PageGeometry, UnmeasurablePolicy};
use crate::error::{CardError, Diagnostic};
use crate::measure::{MeasureContext, Measurer, StyleContext};
use crate::model::{Block, ContentRange, Document};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How much of a block an entry covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum Placement {
    /// The whole block.
    Full,
    /// A run of content units of a splittable block.
    Range(ContentRange),
    /// The block could not be measured; a fixed-height stand-in is drawn.
    Placeholder,
}

/// One block (or fragment of one) placed on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEntry {
    pub block: Arc<Block>,
    /// 0-based position of the block in the document.
    pub position: usize,
    pub placement: Placement,
    /// Measured height in pixels, including the gap after the block.
    pub height: u32,
}

impl PageEntry {
    /// Unit offset where the block continues on the next page, if it does.
    pub fn resume_at(&self) -> Option<usize> {
        match self.placement {
            Placement::Range(r) if r.end < self.block.unit_count() => Some(r.end),
            _ => None,
        }
    }

    /// Whether this entry continues a block started on an earlier page.
    pub fn is_continuation(&self) -> bool {
        matches!(self.placement, Placement::Range(r) if r.start > 0)
    }
}

/// A page of the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub entries: Vec<PageEntry>,
    /// Sum of entry heights.
    pub height: u32,
}

impl Page {
    /// Serialisable view of the page without block payloads.
    pub fn summary(&self) -> PageSummary {
        PageSummary {
            page: self.number,
            height: self.height,
            entries: self
                .entries
                .iter()
                .map(|e| EntrySummary {
                    block: e.position + 1,
                    kind: e.block.kind().name(),
                    placement: e.placement,
                    height: e.height,
                })
                .collect(),
        }
    }
}

/// Plan entry as written to `meta.json` and printed by `--plan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    /// 1-based block position.
    pub block: usize,
    pub kind: &'static str,
    #[serde(flatten)]
    pub placement: Placement,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub page: usize,
    pub height: u32,
    pub entries: Vec<EntrySummary>,
}

/// Result of a pagination pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub pages: Vec<Page>,
    pub diagnostics: Vec<Diagnostic>,
    /// Content height the pages were fitted to.
    pub content_height: u32,
}

impl Pagination {
    /// Pages taller than the content area. Each holds a single entry.
    pub fn oversized_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages
            .iter()
            .filter(move |p| p.height > self.content_height)
    }
}

/// What made the current page close.
#[derive(Debug, Clone, Copy)]
enum Next {
    /// An atomic block of this height did not fit.
    Atomic(u32),
    /// A splittable block could not start here.
    Splittable,
    /// Page ended mid-block, on an oversized block, or at end of document.
    None,
}

/// Greedy paginator over a [`Measurer`].
pub struct Paginator<'a, M: Measurer + ?Sized> {
    measurer: &'a M,
    ctx: MeasureContext,
    content_height: u32,
    policy: UnmeasurablePolicy,
    placeholder_height: u32,
}

impl<'a, M: Measurer + ?Sized> Paginator<'a, M> {
    pub fn new(measurer: &'a M, geometry: &PageGeometry, style: StyleContext) -> Self {
        Self {
            measurer,
            ctx: MeasureContext::new(geometry, style),
            content_height: geometry.content_height(),
            policy: UnmeasurablePolicy::Fail,
            placeholder_height: 240,
        }
    }

    pub fn from_config(measurer: &'a M, config: &ConversionConfig) -> Self {
        Self::new(measurer, &config.geometry, config.style.clone())
            .with_policy(config.unmeasurable_policy, config.placeholder_height)
    }

    pub fn with_policy(mut self, policy: UnmeasurablePolicy, placeholder_height: u32) -> Self {
        self.policy = policy;
        self.placeholder_height = placeholder_height;
        self
    }

    /// Run the pass. Fails on an empty document, on an unmeasurable block
    /// under [`UnmeasurablePolicy::Fail`], or when the measurer breaks its
    /// contract; no pages are returned in either case.
    pub fn paginate(&self, doc: &Document) -> Result<Pagination, CardError> {
        if doc.is_empty() {
            return Err(CardError::EmptyDocument);
        }

        let mut layout = Layout::new(self.content_height);
        for (position, block) in doc.blocks.iter().enumerate() {
            let height = match self.measurer.measure(block, &self.ctx) {
                Ok(h) => h,
                Err(e) => match self.policy {
                    UnmeasurablePolicy::Fail => {
                        return Err(CardError::MeasurementUnavailable {
                            block: position + 1,
                            kind: block.kind().name(),
                            detail: e.to_string(),
                        });
                    }
                    UnmeasurablePolicy::Placeholder => {
                        warn!(
                            "Block {} ({}) replaced by placeholder: {}",
                            position + 1,
                            block.kind().name(),
                            e
                        );
                        layout.diagnostics.push(Diagnostic::UnmeasurableBlockReplaced {
                            block: position + 1,
                            detail: e.to_string(),
                        });
                        layout.place_atomic(
                            block,
                            position,
                            self.placeholder_height,
                            Placement::Placeholder,
                        );
                        continue;
                    }
                },
            };

            if block.is_splittable() {
                self.place_splittable(&mut layout, block, position)?;
            } else {
                layout.place_atomic(block, position, height, Placement::Full);
            }
        }
        layout.close(Next::None);

        info!(
            "Paginated {} blocks into {} pages ({} diagnostics)",
            doc.len(),
            layout.pages.len(),
            layout.diagnostics.len()
        );
        Ok(Pagination {
            pages: layout.pages,
            diagnostics: layout.diagnostics,
            content_height: self.content_height,
        })
    }

    fn place_splittable(
        &self,
        layout: &mut Layout,
        block: &Arc<Block>,
        position: usize,
    ) -> Result<(), CardError> {
        let units = block.unit_count();
        let contract = |detail: String| CardError::MeasurerContract {
            block: position + 1,
            detail,
        };
        let mut offset = 0;

        loop {
            let at_top = layout.current.is_empty();
            let remaining = layout.remaining();
            let fragment = self
                .measurer
                .measure_from(block, offset, &self.ctx, remaining, at_top)
                .map_err(|e| CardError::MeasurementUnavailable {
                    block: position + 1,
                    kind: block.kind().name(),
                    detail: e.to_string(),
                })?;

            if let Some(n) = fragment.next.filter(|&n| n > units) {
                return Err(contract(format!(
                    "resume offset {n} is past the block's {units} units"
                )));
            }
            // Resuming at the last unit means the block is done.
            let next = fragment.next.filter(|&n| n < units);
            let end = next.unwrap_or(units);
            if end <= offset && next.is_some() {
                if at_top {
                    return Err(contract(format!(
                        "no progress from unit {offset} at the top of an empty page"
                    )));
                }
                layout.close(Next::Splittable);
                continue;
            }
            if fragment.height > remaining {
                if !at_top {
                    return Err(contract(format!(
                        "fragment of {}px exceeds the {remaining}px requested",
                        fragment.height
                    )));
                }
                layout.oversized(position, fragment.height);
            }

            debug_assert!(end > offset, "empty range {offset}..{end}");
            layout.place(PageEntry {
                block: Arc::clone(block),
                position,
                placement: Placement::Range(ContentRange::new(offset, end)),
                height: fragment.height,
            });

            match next {
                Some(next) => {
                    offset = next;
                    layout.close(Next::None);
                }
                None => return Ok(()),
            }
        }
    }
}

/// Mutable state of one pass.
struct Layout {
    content_height: u32,
    pages: Vec<Page>,
    current: Vec<PageEntry>,
    used: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Layout {
    fn new(content_height: u32) -> Self {
        Self {
            content_height,
            pages: Vec::new(),
            current: Vec::new(),
            used: 0,
            diagnostics: Vec::new(),
        }
    }

    fn remaining(&self) -> u32 {
        self.content_height.saturating_sub(self.used)
    }

    fn page_number(&self) -> usize {
        self.pages.len() + 1
    }

    fn place(&mut self, entry: PageEntry) {
        self.used += entry.height;
        self.current.push(entry);
    }

    fn oversized(&mut self, position: usize, height: u32) {
        let page = self.page_number();
        warn!(
            "Block {} is {}px tall, exceeding the {}px page; placed alone on page {}",
            position + 1,
            height,
            self.content_height,
            page
        );
        self.diagnostics.push(Diagnostic::OversizedBlock {
            block: position + 1,
            page,
            height,
            content_height: self.content_height,
        });
    }

    fn place_atomic(&mut self, block: &Arc<Block>, position: usize, height: u32, placement: Placement) {
        let entry = PageEntry {
            block: Arc::clone(block),
            position,
            placement,
            height,
        };
        loop {
            if height <= self.remaining() {
                self.place(entry);
                return;
            }
            if self.current.is_empty() {
                self.oversized(position, height);
                self.place(entry);
                self.close(Next::None);
                return;
            }
            self.close(Next::Atomic(height));
        }
    }

    /// Close the current page, carrying a trailing keep-with-next run over
    /// to the new page when `next` could follow it there.
    fn close(&mut self, next: Next) {
        if self.current.is_empty() {
            return;
        }

        let run = self
            .current
            .iter()
            .rev()
            .take_while(|e| e.block.keep_with_next() && e.placement == Placement::Full)
            .count();
        let run_height: u32 = self.current[self.current.len() - run..]
            .iter()
            .map(|e| e.height)
            .sum();
        // The run only moves when the next block can share the fresh page with it.
        let fits_fresh = match next {
            Next::Atomic(h) => run_height + h <= self.content_height,
            Next::Splittable => true,
            Next::None => false,
        };
        let carried = if fits_fresh && run > 0 && run < self.current.len() {
            self.current.split_off(self.current.len() - run)
        } else {
            Vec::new()
        };

        let entries = std::mem::take(&mut self.current);
        let height = entries.iter().map(|e| e.height).sum();
        debug!(
            "Page {}: {} entries, {}px{}",
            self.page_number(),
            entries.len(),
            height,
            if carried.is_empty() {
                String::new()
            } else {
                format!(", {} carried to next page", carried.len())
            }
        );
        self.pages.push(Page {
            number: self.page_number(),
            entries,
            height,
        });

        self.used = carried.iter().map(|e| e.height).sum();
        self.current = carried;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{Fragment, MeasureError};
    use crate::model::{BlockKind, ListStyle};

    /// Heights come from the block text: `"h:<px>"` for atomic blocks. Code
    /// blocks cost `line_px` per line.
    struct Fixed {
        line_px: u32,
    }

    impl Fixed {
        fn atomic(&self, block: &Block) -> Result<u32, MeasureError> {
            if let BlockKind::Image { aspect_ratio: None, source } = block.kind() {
                return Err(MeasureError::Unavailable(format!("no size for {source}")));
            }
            block
                .text()
                .strip_prefix("h:")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| MeasureError::Unavailable("no height tag".into()))
        }
    }

    impl Measurer for Fixed {
        fn measure(&self, block: &Block, _ctx: &MeasureContext) -> Result<u32, MeasureError> {
            if block.is_splittable() {
                Ok(block.unit_count() as u32 * self.line_px)
            } else {
                self.atomic(block)
            }
        }

        fn measure_from(
            &self,
            block: &Block,
            offset: usize,
            _ctx: &MeasureContext,
            max_height: u32,
            at_page_top: bool,
        ) -> Result<Fragment, MeasureError> {
            let units = block.unit_count();
            let mut fit = (max_height / self.line_px) as usize;
            if fit == 0 && at_page_top {
                fit = 1;
            }
            let end = (offset + fit).min(units);
            Ok(Fragment {
                height: (end - offset) as u32 * self.line_px,
                next: (end < units).then_some(end),
            })
        }
    }

    fn geometry(content_height: u32) -> PageGeometry {
        PageGeometry::new(1000, content_height)
    }

    fn run(doc: &Document, content_height: u32) -> Result<Pagination, CardError> {
        let m = Fixed { line_px: 10 };
        Paginator::new(&m, &geometry(content_height), StyleContext::default()).paginate(doc)
    }

    fn atomic(h: u32) -> Block {
        Block::list_item(ListStyle::Unordered, 0, format!("h:{h}"))
    }

    fn heading(h: u32) -> Block {
        Block::heading(2, format!("h:{h}"))
    }

    fn code(lines: usize) -> Block {
        Block::code(None, vec!["x"; lines].join("\n"))
    }

    fn positions(page: &Page) -> Vec<usize> {
        page.entries.iter().map(|e| e.position).collect()
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = run(&Document::new(), 1000).unwrap_err();
        assert!(matches!(err, CardError::EmptyDocument));
    }

    #[test]
    fn exact_fit_stays_on_the_current_page() {
        let doc: Document = [atomic(600), atomic(400), atomic(1)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(p.pages.len(), 2);
        assert_eq!(positions(&p.pages[0]), vec![0, 1]);
        assert_eq!(p.pages[0].height, 1000);
        assert_eq!(p.pages[1].number, 2);
    }

    #[test]
    fn oversized_block_is_placed_alone_and_reported() {
        let doc: Document = [atomic(300), atomic(2500), atomic(300)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(p.pages.len(), 3);
        assert_eq!(positions(&p.pages[1]), vec![1]);
        assert_eq!(p.oversized_pages().count(), 1);
        assert_eq!(
            p.diagnostics,
            vec![Diagnostic::OversizedBlock {
                block: 2,
                page: 2,
                height: 2500,
                content_height: 1000
            }]
        );
    }

    #[test]
    fn splittable_block_continues_across_pages() {
        let doc: Document = [atomic(950), code(30)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(p.pages.len(), 2);
        let first = &p.pages[0].entries[1];
        assert_eq!(first.placement, Placement::Range(ContentRange::new(0, 5)));
        assert_eq!(first.resume_at(), Some(5));
        let second = &p.pages[1].entries[0];
        assert_eq!(second.placement, Placement::Range(ContentRange::new(5, 30)));
        assert!(second.is_continuation());
        assert_eq!(second.resume_at(), None);
    }

    #[test]
    fn heading_moves_with_the_block_that_follows_it() {
        let doc: Document = [atomic(800), heading(100), atomic(300)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(positions(&p.pages[0]), vec![0]);
        assert_eq!(positions(&p.pages[1]), vec![1, 2]);
        assert_eq!(p.pages[1].height, 400);
    }

    #[test]
    fn heading_run_is_moved_as_a_whole() {
        let doc: Document = [atomic(700), heading(100), heading(100), atomic(300)]
            .into_iter()
            .collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(positions(&p.pages[0]), vec![0]);
        assert_eq!(positions(&p.pages[1]), vec![1, 2, 3]);
    }

    #[test]
    fn heading_is_not_moved_when_it_would_empty_the_page() {
        let doc: Document = [heading(900), atomic(300)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(positions(&p.pages[0]), vec![0]);
        assert_eq!(positions(&p.pages[1]), vec![1]);
    }

    #[test]
    fn heading_is_not_moved_before_an_oversized_block() {
        let doc: Document = [atomic(500), heading(100), atomic(1500)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(positions(&p.pages[0]), vec![0, 1]);
        assert_eq!(positions(&p.pages[1]), vec![2]);
    }

    #[test]
    fn heading_moves_ahead_of_a_splittable_block_that_cannot_start() {
        // 995 used: not even one 10px code line fits after the heading.
        let doc: Document = [atomic(895), heading(100), code(3)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(positions(&p.pages[0]), vec![0]);
        assert_eq!(positions(&p.pages[1]), vec![1, 2]);
        assert_eq!(
            p.pages[1].entries[1].placement,
            Placement::Range(ContentRange::new(0, 3))
        );
    }

    #[test]
    fn heading_stays_when_the_next_block_cannot_fit_below_it() {
        let doc: Document = [atomic(500), heading(100), atomic(950)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        assert_eq!(p.pages.len(), 2);
        assert_eq!(positions(&p.pages[0]), vec![0, 1]);
        assert_eq!(positions(&p.pages[1]), vec![2]);
    }

        #[test]
    fn unmeasurable_block_fails_by_default() {
        let doc: Document = [atomic(100), Block::image("lost.png", "", None)]
            .into_iter()
            .collect();
        let err = run(&doc, 1000).unwrap_err();
        assert_eq!(err.block_position(), Some(2));
        assert!(matches!(err, CardError::MeasurementUnavailable { kind: "image", .. }));
    }

    #[test]
    fn placeholder_policy_substitutes_and_reports() {
        let doc: Document = [atomic(100), Block::image("lost.png", "", None)]
            .into_iter()
            .collect();
        let m = Fixed { line_px: 10 };
        let p = Paginator::new(&m, &geometry(1000), StyleContext::default())
            .with_policy(UnmeasurablePolicy::Placeholder, 240)
            .paginate(&doc)
            .unwrap();
        let entry = &p.pages[0].entries[1];
        assert_eq!(entry.placement, Placement::Placeholder);
        assert_eq!(entry.height, 240);
        assert!(matches!(
            p.diagnostics[0],
            Diagnostic::UnmeasurableBlockReplaced { block: 2, .. }
        ));
    }

    struct Stuck;

    impl Measurer for Stuck {
        fn measure(&self, block: &Block, _ctx: &MeasureContext) -> Result<u32, MeasureError> {
            Ok(block.unit_count() as u32 * 10)
        }

        fn measure_from(
            &self,
            _block: &Block,
            offset: usize,
            _ctx: &MeasureContext,
            _max_height: u32,
            _at_page_top: bool,
        ) -> Result<Fragment, MeasureError> {
            Ok(Fragment {
                height: 0,
                next: Some(offset),
            })
        }
    }

    #[test]
    fn no_progress_at_page_top_is_a_contract_error() {
        let doc: Document = [code(4)].into_iter().collect();
        let err = Paginator::new(&Stuck, &geometry(1000), StyleContext::default())
            .paginate(&doc)
            .unwrap_err();
        assert!(matches!(err, CardError::MeasurerContract { block: 1, .. }));
        assert_eq!(err.stage(), crate::error::Stage::Pagination);
    }

    /// Reports `Some(unit_count)` instead of `None` once the block is done.
    struct ExplicitEnd(Fixed);

    impl Measurer for ExplicitEnd {
        fn measure(&self, block: &Block, ctx: &MeasureContext) -> Result<u32, MeasureError> {
            self.0.measure(block, ctx)
        }

        fn measure_from(
            &self,
            block: &Block,
            offset: usize,
            ctx: &MeasureContext,
            max_height: u32,
            at_page_top: bool,
        ) -> Result<Fragment, MeasureError> {
            let mut fragment = self.0.measure_from(block, offset, ctx, max_height, at_page_top)?;
            fragment.next = Some(fragment.next.unwrap_or_else(|| block.unit_count()));
            Ok(fragment)
        }
    }

    #[test]
    fn resume_offset_at_the_last_unit_ends_the_block() {
        let m = ExplicitEnd(Fixed { line_px: 12 });
        let paginator = Paginator::new(&m, &geometry(1000), StyleContext::default());

        let doc: Document = [code(3)].into_iter().collect();
        let p = paginator.paginate(&doc).unwrap();
        assert_eq!(p.pages.len(), 1);
        assert_eq!(p.pages[0].entries[0].placement, Placement::Range(ContentRange::new(0, 3)));
        assert_eq!(p.pages[0].height, 36);

        let doc: Document = [atomic(980), code(3)].into_iter().collect();
        let p = paginator.paginate(&doc).unwrap();
        assert_eq!(p.pages.len(), 2);
        for entry in p.pages.iter().flat_map(|page| &page.entries) {
            if let Placement::Range(r) = entry.placement {
                assert!(r.start < r.end, "empty range on block {}", entry.position);
            }
        }
        assert_eq!(p.pages[1].entries[0].placement, Placement::Range(ContentRange::new(1, 3)));
        assert_eq!(p.pages[1].entries[0].resume_at(), None);
    }

    struct Overshoot;

    impl Measurer for Overshoot {
        fn measure(&self, block: &Block, _ctx: &MeasureContext) -> Result<u32, MeasureError> {
            Ok(block.unit_count() as u32 * 10)
        }

        fn measure_from(
            &self,
            block: &Block,
            _offset: usize,
            _ctx: &MeasureContext,
            _max_height: u32,
            _at_page_top: bool,
        ) -> Result<Fragment, MeasureError> {
            Ok(Fragment {
                height: 10,
                next: Some(block.unit_count() + 1),
            })
        }
    }

    #[test]
    fn resume_offset_past_the_block_is_a_contract_error() {
        let doc: Document = [atomic(100), code(4)].into_iter().collect();
        let err = Paginator::new(&Overshoot, &geometry(1000), StyleContext::default())
            .paginate(&doc)
            .unwrap_err();
        assert!(matches!(err, CardError::MeasurerContract { block: 2, .. }));
    }

        #[test]
    fn summary_uses_one_based_blocks() {
        let doc: Document = [heading(50), atomic(50)].into_iter().collect();
        let p = run(&doc, 1000).unwrap();
        let s = p.pages[0].summary();
        assert_eq!(s.entries[0].block, 1);
        assert_eq!(s.entries[0].kind, "heading");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["entries"][1]["placement"], "full");
    }
}
