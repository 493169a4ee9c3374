//! Error types for the cardpress library.
//!
//! Three kinds of outcome are kept apart:
//!
//! * [`CardError`] — **Fatal**: the run cannot produce output (empty
//!   document, unmeasurable block under the `Fail` policy, bad config).
//!   Returned as `Err(CardError)` from the top-level `convert*` functions.
//!   Every variant knows which [`Stage`] it belongs to and, where it applies,
//!   the page index and block position involved.
//!
//! * [`PageError`] — **Non-fatal**: one page could not be rasterised. Stored
//!   inside [`crate::output::PageResult`] so the caller still receives every
//!   page that did succeed.
//!
//! * [`Diagnostic`] — **Informational**: the run succeeded but something is
//!   worth reporting (a block taller than a page, a block replaced by a
//!   placeholder, pages beyond the safety cap).
//!
//! Block positions and page numbers in messages are 1-based.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a fatal error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Measurement,
    Pagination,
    Rasterization,
    Output,
    Configuration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Parsing => "parsing",
            Stage::Measurement => "measurement",
            Stage::Pagination => "pagination",
            Stage::Rasterization => "rasterization",
            Stage::Output => "output",
            Stage::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the cardpress library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CardError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input could not be turned into a block sequence.
    #[error("Failed to parse '{path}'{}: {detail}", at_line(.line))]
    InputParse {
        path: PathBuf,
        line: Option<usize>,
        detail: String,
    },

    /// The document has no blocks, so there is nothing to paginate.
    #[error("Document is empty: no blocks to paginate")]
    EmptyDocument,

    // ── Measurement / pagination errors ──────────────────────────────────
    /// The measurement backend could not size a block.
    #[error("Cannot measure {kind} at block {block}: {detail}\nRe-run with the placeholder policy to substitute it.")]
    MeasurementUnavailable {
        block: usize,
        kind: &'static str,
        detail: String,
    },

    /// The measurer broke its contract (e.g. made no progress at the top of
    /// an empty page).
    #[error("Measurer contract violated at block {block}: {detail}")]
    MeasurerContract { block: usize, detail: String },

    // ── Rasterisation outcomes ───────────────────────────────────────────
    /// Every submitted page failed; there is no output at all.
    #[error("All {total} pages failed to rasterise.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// Some pages succeeded but at least one failed or was never submitted.
    ///
    /// Returned by [`crate::output::ConversionOutput::into_result`] when
    /// the caller wants to treat any page failure as an error.
    #[error("{failed}/{total} pages failed during rasterization (first failure: page {first_failed_page})")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
        first_failed_page: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (worker panic, runtime setup, encoding).
    #[error("Internal error during {stage}: {detail}")]
    Internal { stage: Stage, detail: String },
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

impl CardError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            CardError::InputNotFound { .. }
            | CardError::PermissionDenied { .. }
            | CardError::InputParse { .. }
            | CardError::EmptyDocument => Stage::Parsing,
            CardError::MeasurementUnavailable { .. } => Stage::Measurement,
            CardError::MeasurerContract { .. } => Stage::Pagination,
            CardError::AllPagesFailed { .. } | CardError::PartialFailure { .. } => {
                Stage::Rasterization
            }
            CardError::OutputWriteFailed { .. } => Stage::Output,
            CardError::InvalidConfig(_) => Stage::Configuration,
            CardError::Internal { stage, .. } => *stage,
        }
    }

    pub(crate) fn internal(stage: Stage, detail: impl Into<String>) -> Self {
        CardError::Internal {
            stage,
            detail: detail.into(),
        }
    }

    /// 1-based block position, when the error concerns a single block.
    pub fn block_position(&self) -> Option<usize> {
        match self {
            CardError::MeasurementUnavailable { block, .. }
            | CardError::MeasurerContract { block, .. } => Some(*block),
            _ => None,
        }
    }

    /// 1-based page number, when the error concerns a single page.
    pub fn page(&self) -> Option<usize> {
        match self {
            CardError::PartialFailure {
                first_failed_page, ..
            } => Some(*first_failed_page),
            _ => None,
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page fails.
/// Pages that already produced artifacts are never affected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Capture failed after all retries.
    #[error("Page {page}: rasterization failed after {retries} retries: {detail}")]
    RasterizationFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The page was never handed to the backend because an earlier page
    /// failed fatally.
    #[error("Page {page}: not submitted after an earlier page failed")]
    NotSubmitted { page: usize },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::RasterizationFailed { page, .. } | PageError::NotSubmitted { page } => *page,
        }
    }
}

/// Non-fatal findings recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A block (or one unit of a splittable block) is taller than a page and
    /// was placed alone, overflowing the canvas.
    OversizedBlock {
        block: usize,
        page: usize,
        height: u32,
        content_height: u32,
    },

    /// A block could not be measured and was replaced by a placeholder.
    UnmeasurableBlockReplaced { block: usize, detail: String },

    /// More pages were produced than the configured cap; the rest were not
    /// rendered.
    PagesTruncated { rendered: usize, total: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::OversizedBlock {
                block,
                page,
                height,
                content_height,
            } => write!(
                f,
                "block {block} on page {page} is {height}px tall, exceeding the {content_height}px content area"
            ),
            Diagnostic::UnmeasurableBlockReplaced { block, detail } => {
                write!(f, "block {block} replaced by a placeholder: {detail}")
            }
            Diagnostic::PagesTruncated { rendered, total } => {
                write!(f, "only the first {rendered} of {total} pages were rendered")
            }
        }
    }
}
