//! Rasterisation boundary: backends that turn a [`Surface`] into pixels.
//!
//! A backend implements [`Rasterizer`]. Each page is captured inside a
//! [`RenderSession`] (a browser tab, a GPU context, a reusable canvas)
//! taken from a [`SessionPool`]. Sessions are reset before every page and
//! returned to the pool after a successful capture; a session that failed
//! is dropped so a broken tab is never reused.
//!
//! Capture is expected to be idempotent: the coordinator retries it.
//!
//! [`WireframeRasterizer`] is the built-in backend. It paints every item as
//! a kind-coloured box on an exact canvas-sized RGBA buffer, which is enough
//! to eyeball page breaks and keeps the whole pipeline testable without a
//! browser.

use crate::model::BlockKind;
use crate::pipeline::encode::{self, PNG_MEDIA_TYPE};
use crate::pipeline::surface::{Surface, SurfaceItem};
use image::{Rgba, RgbaImage};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors from a rasterisation backend.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("could not open render session: {0}")]
    Session(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("artifact is {actual_width}x{actual_height}, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Encoded image of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    /// 1-based.
    pub page_num: usize,
    pub width: u32,
    pub height: u32,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImageArtifact {
    pub fn png(page_num: usize, width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self {
            page_num,
            width,
            height,
            media_type: PNG_MEDIA_TYPE.to_string(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn data_uri(&self) -> String {
        encode::data_uri(&self.media_type, &self.bytes)
    }

    /// File extension for the media type.
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/jpeg" => "jpg",
            _ => "png",
        }
    }

    /// Check declared and, for PNG, encoded dimensions against the canvas.
    pub fn validate(&self, width: u32, height: u32) -> Result<(), RasterError> {
        let (actual_width, actual_height) = if self.media_type == PNG_MEDIA_TYPE {
            encode::encoded_dimensions(&self.bytes)?
        } else {
            (self.width, self.height)
        };
        if (self.width, self.height) != (width, height) || (actual_width, actual_height) != (width, height) {
            return Err(RasterError::SizeMismatch {
                width,
                height,
                actual_width,
                actual_height,
            });
        }
        Ok(())
    }
}

/// A scoped backend resource a page is captured in.
pub trait RenderSession: Send {
    /// Clear all state left by the previous page and size the viewport.
    fn reset(&mut self, width: u32, height: u32) -> Result<(), RasterError>;
}

/// A rasterisation backend.
///
/// `capture` runs on a blocking worker thread; implementations may block.
pub trait Rasterizer: Send + Sync + 'static {
    type Session: RenderSession + 'static;

    fn open_session(&self) -> Result<Self::Session, RasterError>;

    fn capture(&self, session: &mut Self::Session, surface: &Surface) -> Result<ImageArtifact, RasterError>;
}

/// Idle sessions waiting for the next page.
///
/// Never holds more sessions than pages that were in flight at once, so its
/// size is bounded by the coordinator's concurrency.
pub struct SessionPool<S> {
    idle: Mutex<Vec<S>>,
}

impl<S: RenderSession> SessionPool<S> {
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Reuse an idle session or open a new one, then reset it.
    pub fn acquire<R>(&self, rasterizer: &R, width: u32, height: u32) -> Result<S, RasterError>
    where
        R: Rasterizer<Session = S>,
    {
        let reused = self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop();
        let mut session = match reused {
            Some(s) => s,
            None => {
                debug!("Opening new render session");
                rasterizer.open_session()?
            }
        };
        session.reset(width, height)?;
        Ok(session)
    }

    pub fn release(&self, session: S) {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).push(session);
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<S: RenderSession> Default for SessionPool<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Acquire a session, capture `surface`, and give the session back only if
/// the capture succeeded.
pub fn capture_with_pool<R: Rasterizer>(
    rasterizer: &R,
    pool: &SessionPool<R::Session>,
    surface: &Surface,
) -> Result<ImageArtifact, RasterError> {
    let mut session = pool.acquire(rasterizer, surface.width, surface.height)?;
    let artifact = rasterizer.capture(&mut session, surface)?;
    artifact.validate(surface.width, surface.height)?;
    pool.release(session);
    Ok(artifact)
}

// ── Wireframe backend ────────────────────────────────────────────────────────

const BACKGROUND: Rgba<u8> = Rgba([250, 248, 244, 255]);
const FOOTER: Rgba<u8> = Rgba([150, 150, 150, 255]);
const MARKER: Rgba<u8> = Rgba([230, 90, 70, 255]);

/// Paints surfaces as coloured boxes with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireframeRasterizer;

/// Reusable canvas buffer.
pub struct WireframeSession {
    canvas: RgbaImage,
}

impl RenderSession for WireframeSession {
    fn reset(&mut self, width: u32, height: u32) -> Result<(), RasterError> {
        if self.canvas.dimensions() != (width, height) {
            self.canvas = RgbaImage::new(width, height);
        }
        for px in self.canvas.pixels_mut() {
            *px = BACKGROUND;
        }
        Ok(())
    }
}

impl Rasterizer for WireframeRasterizer {
    type Session = WireframeSession;

    fn open_session(&self) -> Result<WireframeSession, RasterError> {
        Ok(WireframeSession {
            canvas: RgbaImage::new(0, 0),
        })
    }

    fn capture(&self, session: &mut WireframeSession, surface: &Surface) -> Result<ImageArtifact, RasterError> {
        let canvas = &mut session.canvas;
        if canvas.dimensions() != (surface.width, surface.height) {
            return Err(RasterError::Capture(format!(
                "session canvas is {}x{}, surface is {}x{}",
                canvas.width(),
                canvas.height(),
                surface.width,
                surface.height
            )));
        }

        for item in &surface.items {
            paint_item(canvas, item);
        }

        // Footer: a bar whose width follows the label length, centred in the
        // bottom margin.
        let g = &surface.geometry;
        let bar_w = 14 * surface.footer.chars().count() as u32;
        let bar_h = (g.margin_bottom / 6).max(2);
        let bar_y = surface.height.saturating_sub(g.margin_bottom / 2);
        fill(canvas, surface.width.saturating_sub(bar_w) / 2, bar_y, bar_w, bar_h, FOOTER);

        let bytes = encode::encode_png(canvas)?;
        Ok(ImageArtifact::png(surface.page_num, surface.width, surface.height, bytes))
    }
}

fn kind_colour(kind: &BlockKind) -> Rgba<u8> {
    match kind {
        BlockKind::Heading { .. } => Rgba([40, 40, 48, 255]),
        BlockKind::Paragraph => Rgba([190, 190, 196, 255]),
        BlockKind::ListItem { .. } => Rgba([160, 180, 210, 255]),
        BlockKind::CodeBlock { .. } => Rgba([60, 64, 80, 255]),
        BlockKind::Image { .. } => Rgba([120, 190, 170, 255]),
        BlockKind::Divider => Rgba([210, 200, 180, 255]),
    }
}

fn paint_item(canvas: &mut RgbaImage, item: &SurfaceItem) {
    let colour = kind_colour(&item.kind);
    let (x, y, w, h) = (item.x, item.y, item.width, item.height);
    if item.placeholder {
        // Diagonal hatching
        for row in 0..h {
            for col in (0..w).filter(|c| (c + row) % 16 < 2) {
                put(canvas, x + col, y + row, colour);
            }
        }
    } else {
        fill(canvas, x, y, w, h, colour);
    }
    if item.continued_from_previous {
        fill(canvas, x, y, w.min(48), 4, MARKER);
    }
    if item.continues {
        fill(canvas, x + w.saturating_sub(48), (y + h).saturating_sub(4), w.min(48), 4, MARKER);
    }
}

/// Fill a rectangle, clipped to the canvas.
fn fill(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, colour: Rgba<u8>) {
    let x_end = x.saturating_add(w).min(canvas.width());
    let y_end = y.saturating_add(h).min(canvas.height());
    for py in y.min(y_end)..y_end {
        for px in x.min(x_end)..x_end {
            canvas.put_pixel(px, py, colour);
        }
    }
}

fn put(canvas: &mut RgbaImage, x: u32, y: u32, colour: Rgba<u8>) {
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, colour);
    }
}
