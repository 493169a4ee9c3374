//! Streaming conversion API: emit pages as they are rasterised.
//!
//! Unlike the eager [`crate::convert::convert`] which returns only after
//! every page has been attempted, [`convert_stream`] paginates up front and
//! then yields one item per page as soon as its capture finishes. Pages
//! arrive in completion order; sort by `page_num` if order matters.
//!
//! Pagination errors (empty document, unmeasurable block, measurer contract)
//! are still reported before the stream is returned, so a caller never sees
//! a partial stream for a document that cannot be laid out. Pagination
//! diagnostics come back next to the stream in [`StreamingConversion`].

use crate::config::ConversionConfig;
use crate::convert::{apply_page_cap, paginate_blocking};
use crate::error::{CardError, Diagnostic, PageError};
use crate::measure::Measurer;
use crate::model::Document;
use crate::output::PageResult;
use crate::paginate::Pagination;
use crate::pipeline::raster::Rasterizer;
use crate::pipeline::render::RenderContext;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageResult, PageError>> + Send>>;

/// A paginated document whose pages are still being rasterised.
pub struct StreamingConversion {
    /// One item per rendered page, in completion order.
    pub pages: PageStream,
    /// Pagination findings, including a [`Diagnostic::PagesTruncated`] when
    /// the page cap applied.
    pub diagnostics: Vec<Diagnostic>,
    /// Pages the document paginated into, before the cap.
    pub total_pages: usize,
    /// Pages the stream will yield.
    pub rendered_pages: usize,
}

/// Paginate `document` and stream its pages as they are rasterised.
///
/// The progress callback sees `on_conversion_start` before this returns and
/// `on_conversion_complete` once the stream has yielded its last page.
///
/// # Returns
/// - `Ok(StreamingConversion)`: the page stream plus pagination diagnostics
/// - `Err(CardError)`: the document could not be paginated
pub async fn convert_stream<M, R>(
    document: impl Into<Arc<Document>>,
    measurer: Arc<M>,
    rasterizer: Arc<R>,
    config: &ConversionConfig,
) -> Result<StreamingConversion, CardError>
where
    M: Measurer + 'static,
    R: Rasterizer,
{
    let document: Arc<Document> = document.into();
    info!("Starting streaming conversion ({} blocks)", document.len());

    if document.is_empty() {
        return Err(CardError::EmptyDocument);
    }

    // ── Paginate ─────────────────────────────────────────────────────────
    let Pagination {
        mut pages,
        mut diagnostics,
        ..
    } = paginate_blocking(document, measurer, config).await?;
    let total_pages = pages.len();
    apply_page_cap(&mut pages, &mut diagnostics, config.max_pages);
    for diagnostic in &diagnostics {
        warn!("{}", diagnostic);
    }

    // ── Build the stream ─────────────────────────────────────────────────
    let rendered_pages = pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(rendered_pages);
    }
    let ctx = RenderContext::new(rasterizer, rendered_pages, config);
    let succeeded = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&succeeded);
    let mut callback = config.progress_callback.clone();

    let s = stream::iter(pages.into_iter().map(move |page| {
        let ctx = ctx.clone();
        async move {
            let mut result = ctx.render_page(page).await;
            match result.error.take() {
                None => Ok(result),
                Some(err) => Err(err),
            }
        }
    }))
    .buffer_unordered(config.concurrency)
    .inspect(move |item| {
        if item.is_ok() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    })
    .chain(stream::poll_fn(move |_| {
        // Runs once: `chain` stops polling after the first `None`.
        if let Some(cb) = callback.take() {
            let success = succeeded.load(Ordering::Relaxed);
            info!(
                "Streaming conversion complete: {}/{} pages",
                success, rendered_pages
            );
            cb.on_conversion_complete(rendered_pages, success);
        }
        Poll::<Option<Result<PageResult, PageError>>>::Ready(None)
    }));

    Ok(StreamingConversion {
        pages: Box::pin(s),
        diagnostics,
        total_pages,
        rendered_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MetricsMeasurer;
    use crate::model::Block;
    use crate::pipeline::raster::WireframeRasterizer;
    use crate::progress::ConversionProgressCallback;
    use std::sync::Mutex;

    fn long_doc() -> Document {
        let text = "streamed cards arrive as soon as they are ready ".repeat(40);
        (0..4).map(|_| Block::paragraph(text.clone())).collect()
    }

    fn small_cards() -> crate::config::ConversionConfigBuilder {
        ConversionConfig::builder()
            .canvas_size(414, 553)
            .margins(40, 50, 32)
            .concurrency(3)
    }

    #[derive(Default)]
    struct Completion {
        events: Mutex<Vec<(usize, usize)>>,
    }

    impl ConversionProgressCallback for Completion {
        fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
            self.events.lock().unwrap().push((total_pages, success_count));
        }
    }

    #[tokio::test]
    async fn streams_every_page_once() {
        let completion = Arc::new(Completion::default());
        let config = small_cards()
            .max_pages(None)
            .progress_callback(completion.clone())
            .build()
            .unwrap();
        let doc = long_doc();

        let expected = crate::convert::paginate_document(&doc, &MetricsMeasurer, &config)
            .unwrap()
            .pages
            .len();
        let conversion = convert_stream(doc, Arc::new(MetricsMeasurer), Arc::new(WireframeRasterizer), &config)
            .await
            .unwrap();
        assert_eq!(conversion.total_pages, expected);
        assert_eq!(conversion.rendered_pages, expected);
        assert!(conversion.diagnostics.is_empty());

        let mut pages: Vec<usize> = conversion
            .pages
            .map(|item| item.map(|r| r.page_num).unwrap())
            .collect()
            .await;
        pages.sort_unstable();
        assert_eq!(pages, (1..=expected).collect::<Vec<_>>());
        assert_eq!(*completion.events.lock().unwrap(), vec![(expected, expected)]);
    }

    #[tokio::test]
    async fn page_cap_limits_the_stream_and_is_reported() {
        let config = small_cards().max_pages(Some(3)).build().unwrap();
        let doc = long_doc();
        let total = crate::convert::paginate_document(&doc, &MetricsMeasurer, &config)
            .unwrap()
            .pages
            .len();
        assert!(total > 3);

        let conversion = convert_stream(doc, Arc::new(MetricsMeasurer), Arc::new(WireframeRasterizer), &config)
            .await
            .unwrap();
        assert_eq!(conversion.total_pages, total);
        assert_eq!(conversion.rendered_pages, 3);
        assert_eq!(
            conversion.diagnostics,
            vec![Diagnostic::PagesTruncated { rendered: 3, total }]
        );

        let mut pages: Vec<usize> = conversion
            .pages
            .map(|item| item.map(|r| r.page_num).unwrap())
            .collect()
            .await;
        pages.sort_unstable();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_document_is_rejected_before_streaming() {
        let result = convert_stream(
            Document::new(),
            Arc::new(MetricsMeasurer),
            Arc::new(WireframeRasterizer),
            &ConversionConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(CardError::EmptyDocument)));
    }
}
