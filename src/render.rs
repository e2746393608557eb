use crate::{
    composite::{RgbFrame, mask_over_in_place},
    core::{FrameIndex, Rgb8},
    error::ReelResult,
    text::{GlyphRasterizer, WrappedLine, line_height_for},
};

/// Drop-shadow offset in pixels, applied to both axes.
pub const SHADOW_OFFSET_PX: i64 = 3;

/// A finished frame and its position in the output sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedFrame {
    pub index: FrameIndex,
    pub pixels: RgbFrame,
}

/// Alpha of the main glyph run at `opacity`.
pub fn text_alpha(opacity: f32) -> u8 {
    (255.0 * f64::from(opacity.clamp(0.0, 1.0))).round() as u8
}

/// Alpha of the drop shadow at `opacity`: 70% of the text alpha before rounding.
pub fn shadow_alpha(opacity: f32) -> u8 {
    (255.0 * f64::from(opacity.clamp(0.0, 1.0)) * 7.0 / 10.0).round() as u8
}

/// Top of the first line so the whole block is vertically centered.
pub fn block_start_y(canvas_height: u32, line_count: usize, line_height: u32) -> i64 {
    let total = line_count as i64 * i64::from(line_height);
    (i64::from(canvas_height) - total).div_euclid(2)
}

/// Composite wrapped, centered text with a drop shadow over a copy of `background`.
///
/// Each line is drawn twice: once in black at `(+3, +3)` with the shadow alpha, then in
/// `color` at its centering offset with the text alpha.
pub fn render_text_frame(
    background: &RgbFrame,
    lines: &[WrappedLine],
    font: &mut dyn GlyphRasterizer,
    color: Rgb8,
    opacity: f32,
) -> ReelResult<RgbFrame> {
    let mut frame = background.clone();
    let alpha = text_alpha(opacity);
    if alpha == 0 || lines.is_empty() {
        return Ok(frame);
    }
    let shadow = shadow_alpha(opacity);

    let line_height = line_height_for(font.size_px());
    let start_y = block_start_y(frame.height, lines.len(), line_height);

    for (i, line) in lines.iter().enumerate() {
        let y = start_y + i as i64 * i64::from(line_height);
        let mask = font.rasterize(&line.text)?;
        mask_over_in_place(
            &mut frame,
            &mask,
            line.offset_x + SHADOW_OFFSET_PX,
            y + SHADOW_OFFSET_PX,
            Rgb8::BLACK,
            shadow,
        );
        mask_over_in_place(&mut frame, &mask, line.offset_x, y, color, alpha);
    }
    Ok(frame)
}
