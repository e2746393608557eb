//! Fonts, measurement and word wrapping.
//!
//! A [`Typeface`] is a resolved font resource. Each rendering worker opens its own
//! [`GlyphRasterizer`] from it at a fixed pixel size; rasterizers keep mutable shaping state and
//! are never shared between threads.

mod builtin;
mod font;
mod shaper;
mod wrap;

use std::sync::Arc;

pub use builtin::BuiltinFace;
pub use font::{FontCandidate, FontSource, default_font_candidates};
pub use shaper::{OutlineFace, TextShaper};
pub use wrap::{WrappedLine, layout_lines, offset_x, wrap};

use crate::{composite::CoverageMask, core::Rgb8, error::ReelResult};

/// Measures and rasterizes single-line glyph runs at a fixed size.
pub trait GlyphRasterizer {
    fn size_px(&self) -> u32;

    /// Advance width of `text` laid out on one line, in pixels.
    fn measure(&mut self, text: &str) -> ReelResult<f32>;

    /// Coverage of `text` laid out on one line with the pen at the line's top-left.
    fn rasterize(&mut self, text: &str) -> ReelResult<Arc<CoverageMask>>;
}

/// A resolved font resource that can open rasterizers.
pub trait Typeface: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn rasterizer(&self, size_px: u32) -> ReelResult<Box<dyn GlyphRasterizer + Send>>;
}

/// Font resource, pixel size and foreground color for one text role.
#[derive(Clone, Debug)]
pub struct FontSpec {
    pub face: Arc<dyn Typeface>,
    pub size_px: u32,
    pub color: Rgb8,
}

impl FontSpec {
    pub fn new(face: Arc<dyn Typeface>, size_px: u32, color: Rgb8) -> Self {
        Self {
            face,
            size_px,
            color,
        }
    }

    /// Vertical distance between consecutive wrapped lines.
    pub fn line_height(&self) -> u32 {
        line_height_for(self.size_px)
    }
}

pub fn line_height_for(size_px: u32) -> u32 {
    (f64::from(size_px) * 1.3).round() as u32
}
