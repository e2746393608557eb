use crate::{error::ReelResult, text::GlyphRasterizer};

/// One output line of [`layout_lines`]: its text, measured width and centering offset.
#[derive(Clone, Debug, PartialEq)]
pub struct WrappedLine {
    pub text: String,
    pub width: f32,
    pub offset_x: i64,
}

/// Greedy word wrap.
///
/// Words are appended to the current line until the measured candidate exceeds `max_width_px`,
/// at which point the last word moves to a new line. A line is only closed when it already
/// holds more than one word, so a single over-wide word stays alone on its own line.
pub fn wrap(
    text: &str,
    max_width_px: f32,
    font: &mut dyn GlyphRasterizer,
) -> ReelResult<Vec<String>> {
    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        current.push(word);
        if current.len() < 2 {
            continue;
        }
        let candidate = current.join(" ");
        if font.measure(&candidate)? > max_width_px {
            current.pop();
            lines.push(current.join(" "));
            current.clear();
            current.push(word);
        }
    }

    if !current.is_empty() {
        lines.push(current.join(" "));
    }
    Ok(lines)
}

/// Left edge that centers a line of `line_width` on a canvas of `canvas_width`.
pub fn offset_x(line_width: f32, canvas_width: u32) -> i64 {
    ((canvas_width as f32 - line_width) / 2.0).floor() as i64
}

/// Wrap `text` and compute each line's width and centering offset.
pub fn layout_lines(
    text: &str,
    max_width_px: f32,
    canvas_width: u32,
    font: &mut dyn GlyphRasterizer,
) -> ReelResult<Vec<WrappedLine>> {
    wrap(text, max_width_px, font)?
        .into_iter()
        .map(|line| {
            let width = font.measure(&line)?;
            Ok(WrappedLine {
                offset_x: offset_x(width, canvas_width),
                text: line,
                width,
            })
        })
        .collect()
}
