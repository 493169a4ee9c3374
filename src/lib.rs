//! # cardpress
//!
//! Turn a structured document into a deck of fixed-size card images plus a
//! short caption, ready to publish as a multi-image post.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .org / .json
//!  │
//!  ├─ 1. Input     parse into a Document (ordered, typed blocks)
//!  ├─ 2. Caption   title + excerpt within a character budget
//!  ├─ 3. Paginate  measure blocks, fill pages, split long text at units
//!  ├─ 4. Render    surface → backend capture, bounded concurrency, retries
//!  ├─ 5. Encode    PNG artifacts exactly canvas-sized
//!  └─ 6. Output    ordered artifacts, plan, diagnostics, stats
//! ```
//!
//! Pagination is pure and deterministic: the same document, geometry and
//! measurer always give the same pages. Measurement and rasterisation are
//! traits ([`Measurer`], [`Rasterizer`]) so a real layout engine or browser
//! can replace the built-in [`MetricsMeasurer`] and [`WireframeRasterizer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardpress::{convert_to_dir, ConversionConfig, Template};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .template(Template::Compact)
//!         .build()?;
//!     let output = convert_to_dir("notes.org", "dist/notes", &config).await?;
//!     println!("{}", output.caption);
//!     eprintln!("{} cards", output.stats.succeeded_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cardpress` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod caption;
pub mod config;
pub mod convert;
pub mod error;
pub mod measure;
pub mod model;
pub mod output;
pub mod paginate;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use caption::CaptionConfig;
pub use config::{ConversionConfig, ConversionConfigBuilder, PageGeometry, UnmeasurablePolicy};
pub use convert::{convert, convert_file, convert_sync, convert_to_dir, paginate_document};
pub use error::{CardError, Diagnostic, PageError, Stage};
pub use measure::{MeasureContext, MeasureError, Measurer, MetricsMeasurer, StyleContext};
pub use model::{Block, BlockKind, ContentRange, Document, Inline, InlineStyle, ListStyle};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, PageResult};
pub use paginate::{Page, PageEntry, Pagination, Paginator, Placement};
pub use pipeline::input::load_document;
pub use pipeline::raster::{ImageArtifact, Rasterizer, RenderSession, WireframeRasterizer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, PageStream, StreamingConversion};
pub use templates::Template;
