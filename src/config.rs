//! Configuration types for document-to-card conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Geometry, text metrics, caption rules
//! and rendering concurrency live in one struct so two runs can be compared
//! field by field: identical config plus identical document means identical
//! page boundaries.

use crate::caption::CaptionConfig;
use crate::error::CardError;
use crate::measure::StyleContext;
use crate::progress::ProgressCallback;
use crate::templates::Template;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canvas dimensions and margins in pixels. Fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub margin_top: u32,
    pub margin_bottom: u32,
    /// Applied to both left and right.
    pub margin_side: u32,
}

impl PageGeometry {
    /// Canvas without margins.
    pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            canvas_width,
            canvas_height,
            margin_top: 0,
            margin_bottom: 0,
            margin_side: 0,
        }
    }

    pub fn with_margins(mut self, top: u32, bottom: u32, side: u32) -> Self {
        self.margin_top = top;
        self.margin_bottom = bottom;
        self.margin_side = side;
        self
    }

    /// Height available to blocks: canvas height minus top and bottom margins.
    pub fn content_height(&self) -> u32 {
        self.canvas_height
            .saturating_sub(self.margin_top)
            .saturating_sub(self.margin_bottom)
    }

    pub fn content_width(&self) -> u32 {
        self.canvas_width.saturating_sub(2 * self.margin_side)
    }
}

impl Default for PageGeometry {
    /// 1242×1660 (3:4) with the default template's margins.
    fn default() -> Self {
        let m = Template::default().margins();
        Self::new(1242, 1660).with_margins(m.top, m.bottom, m.side)
    }
}

/// What to do when the measurer cannot size a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmeasurablePolicy {
    /// Abort the run with `MeasurementUnavailable`. (default)
    #[default]
    Fail,
    /// Substitute a fixed-height placeholder and record a diagnostic.
    Placeholder,
}

/// Configuration for a conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use cardpress::{ConversionConfig, Template};
///
/// let config = ConversionConfig::builder()
///     .template(Template::Compact)
///     .concurrency(2)
///     .caption_char_budget(140)
///     .build()
///     .unwrap();
/// assert_eq!(config.geometry.canvas_width, 1242);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Canvas size and margins. Default: 1242×1660 with template margins.
    pub geometry: PageGeometry,

    /// Template the margins and style were taken from. Default: `clean`.
    pub template: Template,

    /// Text metrics handed to the measurer.
    pub style: StyleContext,

    /// Caption extraction rules.
    pub caption: CaptionConfig,

    /// Behaviour for blocks the measurer cannot size. Default: `Fail`.
    pub unmeasurable_policy: UnmeasurablePolicy,

    /// Height of a substituted placeholder in pixels. Default: 240.
    pub placeholder_height: u32,

    /// Pages rasterised at the same time. Default: 4.
    ///
    /// Each in-flight page holds one backend session and one canvas-sized
    /// buffer (about 8 MB of RGBA at the default size).
    pub concurrency: usize,

    /// Render at most this many pages. Default: 30.
    ///
    /// Card carousels cap out well below this; a document producing more
    /// pages is almost always the wrong input. Pagination still runs over
    /// the whole document and a `PagesTruncated` diagnostic is recorded.
    pub max_pages: Option<usize>,

    /// Capture retries per page. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt.
    /// Default: 200.
    pub retry_backoff_ms: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let template = Template::default();
        Self {
            geometry: PageGeometry::default(),
            template,
            style: template.style(),
            caption: CaptionConfig::default(),
            unmeasurable_policy: UnmeasurablePolicy::default(),
            placeholder_height: 240,
            concurrency: 4,
            max_pages: Some(30),
            max_retries: 2,
            retry_backoff_ms: 200,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("geometry", &self.geometry)
            .field("template", &self.template)
            .field("style", &self.style)
            .field("caption", &self.caption)
            .field("unmeasurable_policy", &self.unmeasurable_policy)
            .field("placeholder_height", &self.placeholder_height)
            .field("concurrency", &self.concurrency)
            .field("max_pages", &self.max_pages)
            .field("max_retries", &self.max_retries)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    /// Apply a template's margins and style. Call before `margins`/`style`
    /// to override parts of it.
    pub fn template(mut self, template: Template) -> Self {
        let m = template.margins();
        self.config.template = template;
        self.config.style = template.style();
        self.config.geometry = self.config.geometry.with_margins(m.top, m.bottom, m.side);
        self
    }

    pub fn canvas_size(mut self, width: u32, height: u32) -> Self {
        self.config.geometry.canvas_width = width;
        self.config.geometry.canvas_height = height;
        self
    }

    pub fn margins(mut self, top: u32, bottom: u32, side: u32) -> Self {
        self.config.geometry = self.config.geometry.with_margins(top, bottom, side);
        self
    }

    pub fn style(mut self, style: StyleContext) -> Self {
        self.config.style = style;
        self
    }

    pub fn caption(mut self, caption: CaptionConfig) -> Self {
        self.config.caption = caption;
        self
    }

    pub fn caption_char_budget(mut self, chars: usize) -> Self {
        self.config.caption.char_budget = chars.max(1);
        self
    }

    pub fn caption_paragraphs(mut self, n: usize) -> Self {
        self.config.caption.max_paragraphs = n;
        self
    }

    pub fn caption_fallback_title(mut self, title: impl Into<String>) -> Self {
        self.config.caption.fallback_title = title.into();
        self
    }

    pub fn unmeasurable_policy(mut self, policy: UnmeasurablePolicy) -> Self {
        self.config.unmeasurable_policy = policy;
        self
    }

    pub fn placeholder_height(mut self, px: u32) -> Self {
        self.config.placeholder_height = px;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// `None` disables the cap.
    pub fn max_pages(mut self, n: Option<usize>) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, CardError> {
        let c = &self.config;
        let g = &c.geometry;
        if g.canvas_width == 0 || g.canvas_height == 0 {
            return Err(CardError::InvalidConfig(format!(
                "canvas must be non-empty, got {}×{}",
                g.canvas_width, g.canvas_height
            )));
        }
        if g.content_height() == 0 {
            return Err(CardError::InvalidConfig(format!(
                "top + bottom margins ({} + {}) leave no content height on a {}px canvas",
                g.margin_top, g.margin_bottom, g.canvas_height
            )));
        }
        if g.content_width() == 0 {
            return Err(CardError::InvalidConfig(format!(
                "side margins ({} each) leave no content width on a {}px canvas",
                g.margin_side, g.canvas_width
            )));
        }
        if c.concurrency == 0 {
            return Err(CardError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_pages == Some(0) {
            return Err(CardError::InvalidConfig(
                "max_pages must be ≥ 1 (use None to disable the cap)".into(),
            ));
        }
        if c.style.body_font_px <= 0.0 || c.style.code_font_px <= 0.0 {
            return Err(CardError::InvalidConfig("font sizes must be positive".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_three_by_four() {
        let g = PageGeometry::default();
        assert_eq!((g.canvas_width, g.canvas_height), (1242, 1660));
        assert_eq!(g.content_height(), 1660 - 120 - 150);
        assert_eq!(g.content_width(), 1242 - 2 * 96);
    }

    #[test]
    fn template_sets_margins_and_style() {
        let c = ConversionConfig::builder()
            .template(Template::Compact)
            .build()
            .unwrap();
        assert_eq!(c.template, Template::Compact);
        assert_eq!(c.geometry.margin_top, Template::Compact.margins().top);
        assert_eq!(c.style, Template::Compact.style());
    }

    #[test]
    fn margins_that_swallow_the_canvas_are_rejected() {
        let err = ConversionConfig::builder()
            .canvas_size(400, 300)
            .margins(200, 100, 10)
            .build()
            .unwrap_err();
        assert!(matches!(err, CardError::InvalidConfig(_)));
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let c = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn zero_page_cap_is_rejected() {
        assert!(ConversionConfig::builder().max_pages(Some(0)).build().is_err());
        assert!(ConversionConfig::builder().max_pages(None).build().is_ok());
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", ConversionConfig::default());
        assert!(s.contains("ConversionConfig"));
    }
}
