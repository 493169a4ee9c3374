//! Progress events for a conversion run.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to follow a
//! run as it paginates and rasterises. Events for different pages may arrive
//! concurrently and out of order; only `on_conversion_start` and
//! `on_conversion_complete` bracket the run.
//!
//! # Example
//!
//! ```rust
//! use cardpress::{ConversionConfig, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Bytes(AtomicUsize);
//!
//! impl ConversionProgressCallback for Bytes {
//!     fn on_page_complete(&self, _page: usize, _total: usize, bytes: usize) {
//!         self.0.fetch_add(bytes, Ordering::Relaxed);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Bytes(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Receives per-page events from the render coordinator.
///
/// All methods default to no-ops. Implementations must be `Send + Sync`
/// because pages are rasterised on a pool of tasks.
pub trait ConversionProgressCallback: Send + Sync {
    /// Pagination finished; `total_pages` pages will be rasterised.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// A page was handed to the backend (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// A page was captured. `bytes` is the encoded artifact size.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, bytes: usize) {
        let _ = (page_num, total_pages, bytes);
    }

    /// A page failed after all retries, or was never submitted.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Every page has been attempted.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
