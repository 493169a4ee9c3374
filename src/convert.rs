//! Eager (whole-document) conversion entry points.
//!
//! [`convert`] runs the full pipeline and returns once every page has been
//! attempted: caption, pagination on a blocking worker, page cap, concurrent
//! rasterisation, stats. Use [`crate::stream::convert_stream`] to receive
//! pages as they finish instead.
//!
//! The measurer and rasteriser are passed in, so the same entry point drives
//! the built-in [`MetricsMeasurer`]/[`WireframeRasterizer`] pair
//! ([`convert_file`]) and any other backend.

use crate::caption;
use crate::config::ConversionConfig;
use crate::error::{CardError, Diagnostic, PageError, Stage};
use crate::measure::{Measurer, MetricsMeasurer};
use crate::model::Document;
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata};
use crate::paginate::{Page, Pagination, Paginator};
use crate::persist;
use crate::pipeline::input;
use crate::pipeline::raster::{Rasterizer, WireframeRasterizer};
use crate::pipeline::render;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Paginate `doc` synchronously. Pure: no rendering, no I/O.
pub fn paginate_document<M: Measurer + ?Sized>(
    doc: &Document,
    measurer: &M,
    config: &ConversionConfig,
) -> Result<Pagination, CardError> {
    Paginator::from_config(measurer, config).paginate(doc)
}

/// Convert a document into page images and a caption.
///
/// # Returns
/// `Ok(ConversionOutput)` when at least one page rendered, even if others
/// failed (check `output.stats.failed_pages`, or call
/// [`ConversionOutput::into_result`]).
///
/// # Errors
/// Fatal errors only: empty document, unmeasurable block under the `Fail`
/// policy, measurer contract violation, or every page failing.
pub async fn convert<M, R>(
    document: impl Into<Arc<Document>>,
    measurer: Arc<M>,
    rasterizer: Arc<R>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, CardError>
where
    M: Measurer + 'static,
    R: Rasterizer,
{
    let total_start = Instant::now();
    let document: Arc<Document> = document.into();
    info!(
        "Starting conversion: {} ({} blocks)",
        document.source.as_deref().unwrap_or("<memory>"),
        document.len()
    );

    // ── Step 1: Caption (independent of pagination) ──────────────────────
    if document.is_empty() {
        return Err(CardError::EmptyDocument);
    }
    let caption = caption::extract(&document, &config.caption);
    debug!("Caption: {} chars", caption.chars().count());

    // ── Step 2: Paginate on a blocking worker ────────────────────────────
    let paginate_start = Instant::now();
    let Pagination {
        mut pages,
        mut diagnostics,
        ..
    } = paginate_blocking(Arc::clone(&document), measurer, config).await?;
    let paginate_duration_ms = paginate_start.elapsed().as_millis() as u64;
    let total_pages = pages.len();
    info!("Paginated into {} pages in {}ms", total_pages, paginate_duration_ms);

    // ── Step 3: Apply the page cap ───────────────────────────────────────
    apply_page_cap(&mut pages, &mut diagnostics, config.max_pages);
    let plan = pages.iter().map(Page::summary).collect::<Vec<_>>();
    let rendered_pages = pages.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(rendered_pages);
    }

    // ── Step 4: Rasterise ────────────────────────────────────────────────
    let render_start = Instant::now();
    let results = render::render_pages(pages, rasterizer, config).await;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Step 5: Stats ────────────────────────────────────────────────────
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let not_submitted = results
        .iter()
        .filter(|r| matches!(r.error, Some(PageError::NotSubmitted { .. })))
        .count();
    let failed = results.len() - succeeded - not_submitted;

    if succeeded == 0 {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(CardError::AllPagesFailed {
            total: results.len(),
            first_error,
        });
    }

    let stats = ConversionStats {
        total_blocks: document.len(),
        total_pages,
        rendered_pages,
        succeeded_pages: succeeded,
        failed_pages: failed,
        not_submitted_pages: not_submitted,
        total_bytes: results
            .iter()
            .filter_map(|r| r.artifact.as_ref())
            .map(|a| a.len())
            .sum(),
        paginate_duration_ms,
        render_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {}/{} pages, {}ms total",
        succeeded, rendered_pages, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(rendered_pages, succeeded);
    }

    let metadata = DocumentMetadata {
        title: caption::title(&document, &config.caption),
        source: document.source.clone(),
        pages: rendered_pages,
        width: config.geometry.canvas_width,
        height: config.geometry.canvas_height,
        template: config.template.to_string(),
    };

    Ok(ConversionOutput {
        caption,
        pages: results,
        plan,
        diagnostics,
        stats,
        metadata,
    })
}

/// Load `path` and convert it with the built-in measurer and wireframe
/// backend.
pub async fn convert_file(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, CardError> {
    let document = input::load_document(path)?;
    convert(
        document,
        Arc::new(MetricsMeasurer),
        Arc::new(WireframeRasterizer),
        config,
    )
    .await
}

/// Convert `path` and write the post (images, caption, metadata) into
/// `out_dir`.
pub async fn convert_to_dir(
    path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, CardError> {
    let output = convert_file(path, config).await?;
    persist::write_output(&output, out_dir.as_ref()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync<M, R>(
    document: impl Into<Arc<Document>>,
    measurer: Arc<M>,
    rasterizer: Arc<R>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, CardError>
where
    M: Measurer + 'static,
    R: Rasterizer,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| {
            CardError::internal(
                Stage::Configuration,
                format!("Failed to create tokio runtime: {}", e),
            )
        })?
        .block_on(convert(document, measurer, rasterizer, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run the pagination pass on the blocking pool; measurement may be slow
/// (a real backend lays text out) and must not stall the async workers.
pub(crate) async fn paginate_blocking<M: Measurer + 'static>(
    document: Arc<Document>,
    measurer: Arc<M>,
    config: &ConversionConfig,
) -> Result<Pagination, CardError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || paginate_document(&document, &*measurer, &config))
        .await
        .map_err(|e| {
            CardError::internal(Stage::Pagination, format!("Pagination task panicked: {}", e))
        })?
}

/// Drop pages beyond `max_pages`, recording what was cut.
pub(crate) fn apply_page_cap(
    pages: &mut Vec<Page>,
    diagnostics: &mut Vec<Diagnostic>,
    max_pages: Option<usize>,
) {
    if let Some(max) = max_pages {
        if pages.len() > max {
            warn!(
                "Document paginates into {} pages; rendering only the first {}",
                pages.len(),
                max
            );
            diagnostics.push(Diagnostic::PagesTruncated {
                rendered: max,
                total: pages.len(),
            });
            pages.truncate(max);
        }
    }
}
