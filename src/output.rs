//! Result types returned by a conversion run.

use crate::error::{CardError, Diagnostic, PageError};
use crate::paginate::PageSummary;
use crate::pipeline::raster::ImageArtifact;
use serde::{Deserialize, Serialize};

/// Outcome of rasterising one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// 1-based.
    pub page_num: usize,
    /// Present exactly when `error` is `None`.
    pub artifact: Option<ImageArtifact>,
    /// Capture attempts beyond the first.
    pub retries: u32,
    pub duration_ms: u64,
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn not_submitted(page_num: usize) -> Self {
        Self {
            page_num,
            artifact: None,
            retries: 0,
            duration_ms: 0,
            error: Some(PageError::NotSubmitted { page: page_num }),
        }
    }
}

/// Counters and timings for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_blocks: usize,
    /// Pages produced by pagination.
    pub total_pages: usize,
    /// Pages handed to the render coordinator (after the page cap).
    pub rendered_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub not_submitted_pages: usize,
    pub total_bytes: usize,
    pub paginate_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Descriptive metadata written next to the images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Pages rendered.
    pub pages: usize,
    pub width: u32,
    pub height: u32,
    pub template: String,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub caption: String,
    /// In page order, successes and failures alike.
    pub pages: Vec<PageResult>,
    /// Page plan for every rendered page.
    pub plan: Vec<PageSummary>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ConversionStats,
    pub metadata: DocumentMetadata,
}

impl ConversionOutput {
    /// Artifacts of successful pages, in page order.
    pub fn artifacts(&self) -> impl Iterator<Item = &ImageArtifact> {
        self.pages.iter().filter_map(|p| p.artifact.as_ref())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(|p| p.error.as_ref())
    }

    /// Treat any failed or unsubmitted page as an error.
    pub fn into_result(self) -> Result<Self, CardError> {
        let failed = self.pages.iter().filter(|p| !p.is_ok()).count();
        if failed == 0 {
            return Ok(self);
        }
        let first_failed_page = self
            .pages
            .iter()
            .find(|p| !p.is_ok())
            .map(|p| p.page_num)
            .unwrap_or_default();
        Err(CardError::PartialFailure {
            success: self.pages.len() - failed,
            failed,
            total: self.pages.len(),
            first_failed_page,
        })
    }
}
