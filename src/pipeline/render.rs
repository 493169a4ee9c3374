//! Render coordinator: rasterise planned pages on a bounded pool.
//!
//! Each page becomes a [`Surface`] and is captured by the backend on a
//! blocking worker (`spawn_blocking`), since real backends drive a browser
//! or GPU synchronously. Up to `concurrency` pages are in flight at once.
//!
//! ## Retry Strategy
//!
//! Capture is idempotent, so a failed attempt is simply repeated after
//! `retry_backoff_ms * 2^(attempt-1)`: with the default 200 ms base and 2
//! retries the waits are 200 ms → 400 ms. The session used by a failed
//! attempt is discarded and the retry starts on a fresh one.
//!
//! ## Halting
//!
//! A page that still fails after all retries halts the run: pages already
//! in flight finish, but no further page is handed to the backend. Those
//! pages come back as [`PageError::NotSubmitted`] so the caller always gets
//! exactly one result per page.

use crate::config::{ConversionConfig, PageGeometry};
use crate::error::PageError;
use crate::output::PageResult;
use crate::paginate::Page;
use crate::pipeline::raster::{capture_with_pool, ImageArtifact, Rasterizer, SessionPool};
use crate::pipeline::surface::{build_surface, Surface};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Per-run state shared by every page task.
pub(crate) struct RenderContext<R: Rasterizer> {
    rasterizer: Arc<R>,
    pool: Arc<SessionPool<R::Session>>,
    halted: Arc<AtomicBool>,
    geometry: PageGeometry,
    total_pages: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    progress: Option<ProgressCallback>,
}

impl<R: Rasterizer> Clone for RenderContext<R> {
    fn clone(&self) -> Self {
        Self {
            rasterizer: Arc::clone(&self.rasterizer),
            pool: Arc::clone(&self.pool),
            halted: Arc::clone(&self.halted),
            geometry: self.geometry,
            total_pages: self.total_pages,
            max_retries: self.max_retries,
            retry_backoff_ms: self.retry_backoff_ms,
            progress: self.progress.clone(),
        }
    }
}

impl<R: Rasterizer> RenderContext<R> {
    pub(crate) fn new(rasterizer: Arc<R>, total_pages: usize, config: &ConversionConfig) -> Self {
        Self {
            rasterizer,
            pool: Arc::new(SessionPool::new()),
            halted: Arc::new(AtomicBool::new(false)),
            geometry: config.geometry,
            total_pages,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            progress: config.progress_callback.clone(),
        }
    }

    /// Rasterise one page, with retries. Never fails: errors are recorded
    /// in the returned [`PageResult`].
    pub(crate) async fn render_page(self, page: Page) -> PageResult {
        let page_num = page.number;
        let total = self.total_pages;

        if self.halted.load(Ordering::SeqCst) {
            warn!("Page {}: not submitted, an earlier page failed", page_num);
            let result = PageResult::not_submitted(page_num);
            if let (Some(cb), Some(e)) = (&self.progress, &result.error) {
                cb.on_page_error(page_num, total, &e.to_string());
            }
            return result;
        }

        if let Some(ref cb) = self.progress {
            cb.on_page_start(page_num, total);
        }
        let start = Instant::now();
        let surface = Arc::new(build_surface(&page, total, &self.geometry));
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page_num, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.capture(Arc::clone(&surface)).await {
                Ok(artifact) => {
                    let duration = start.elapsed();
                    debug!(
                        "Page {}: {} bytes in {:?} ({} retries)",
                        page_num,
                        artifact.len(),
                        duration,
                        attempt
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_page_complete(page_num, total, artifact.len());
                    }
                    return PageResult {
                        page_num,
                        artifact: Some(artifact),
                        retries: attempt,
                        duration_ms: duration.as_millis() as u64,
                        error: None,
                    };
                }
                Err(detail) => {
                    warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, detail);
                    last_err = Some(detail);
                }
            }
        }

        self.halted.store(true, Ordering::SeqCst);
        let error = PageError::RasterizationFailed {
            page: page_num,
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        };
        if let Some(ref cb) = self.progress {
            cb.on_page_error(page_num, total, &error.to_string());
        }
        PageResult {
            page_num,
            artifact: None,
            retries: self.max_retries,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(error),
        }
    }

    async fn capture(&self, surface: Arc<Surface>) -> Result<ImageArtifact, String> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || capture_with_pool(&*rasterizer, &pool, &surface))
            .await
            .map_err(|e| format!("capture task panicked: {e}"))?
            .map_err(|e| e.to_string())
    }
}

/// Rasterise `pages` with up to `config.concurrency` in flight. Results are
/// returned in page order, one per page.
pub async fn render_pages<R: Rasterizer>(
    pages: Vec<Page>,
    rasterizer: Arc<R>,
    config: &ConversionConfig,
) -> Vec<PageResult> {
    let ctx = RenderContext::new(rasterizer, pages.len(), config);
    let mut results: Vec<PageResult> = stream::iter(pages.into_iter().map(|page| ctx.clone().render_page(page)))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    results.sort_by_key(|r| r.page_num);
    results
}
