//! Pipeline stages around the pagination core.
//!
//! Each submodule implements exactly one step and can be swapped without
//! touching the others (a browser backend replaces [`raster`], a Markdown
//! reader extends [`input`]).
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ (paginate) ──▶ surface ──▶ raster ──▶ encode
//! (.org/.json)             (layout)    (backend)  (PNG)
//!                 render coordinates surface → raster for every page
//! ```
//!
//! 1. [`input`]     — read a file into a `Document`; Org subset or JSON
//! 2. [`normalize`] — deterministic text cleanup shared by input and caption
//! 3. [`surface`]   — place a page's entries at canvas coordinates
//! 4. [`raster`]    — backend trait, session pool, built-in wireframe backend
//! 5. [`encode`]    — PNG encoding and data URIs
//! 6. [`render`]    — bounded, retrying, order-preserving page rasterisation

pub mod encode;
pub mod input;
pub mod normalize;
pub mod raster;
pub mod render;
pub mod surface;
