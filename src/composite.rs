use crate::{
    core::Rgb8,
    error::{ReelError, ReelResult},
};

/// Tightly packed row-major RGB24 raster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbFrame {
    pub fn filled(width: u32, height: u32, color: Rgb8) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&color.to_array());
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> ReelResult<Self> {
        if data.len() != width as usize * height as usize * 3 {
            return Err(ReelError::validation(format!(
                "rgb buffer length {} does not match {width}x{height}x3",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb8 {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Rgb8::new(self.data[i], self.data[i + 1], self.data[i + 2])
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.width as usize * 3;
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }
}

/// 8-bit coverage mask of a rasterized glyph run.
///
/// `left`/`top` place the mask's first pixel relative to the line's top-left pen position, so
/// glyphs that overhang the advance box are not cut off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageMask {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
    pub coverage: Vec<u8>,
}

impl CoverageMask {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            left: 0,
            top: 0,
            coverage: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Straight-alpha "over": `src * a + dst * (1 - a)`, per channel.
pub fn over(dst: [u8; 3], src: Rgb8, alpha: u8) -> [u8; 3] {
    if alpha == 0 {
        return dst;
    }
    if alpha == 255 {
        return src.to_array();
    }
    let a = u16::from(alpha);
    let inv = 255u16 - a;
    let s = src.to_array();
    let mut out = [0u8; 3];
    for i in 0..3 {
        out[i] = add_sat_u8(mul_div255(u16::from(s[i]), a), mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Composite a uniform color over the whole frame.
pub fn fill_over_in_place(frame: &mut RgbFrame, color: Rgb8, alpha: u8) {
    if alpha == 0 {
        return;
    }
    for px in frame.data.chunks_exact_mut(3) {
        let out = over([px[0], px[1], px[2]], color, alpha);
        px.copy_from_slice(&out);
    }
}

/// Composite `color` through `mask` scaled by `alpha`, with the pen position at `(x, y)`.
/// Parts of the mask outside the frame are clipped.
pub fn mask_over_in_place(
    frame: &mut RgbFrame,
    mask: &CoverageMask,
    x: i64,
    y: i64,
    color: Rgb8,
    alpha: u8,
) {
    if alpha == 0 || mask.is_empty() {
        return;
    }
    let x = x + i64::from(mask.left);
    let y = y + i64::from(mask.top);

    let (fw, fh) = (i64::from(frame.width), i64::from(frame.height));
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + i64::from(mask.width)).min(fw);
    let y1 = (y + i64::from(mask.height)).min(fh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let a = u16::from(alpha);
    for fy in y0..y1 {
        let my = (fy - y) as usize;
        let mask_row = &mask.coverage[my * mask.width as usize..(my + 1) * mask.width as usize];
        let row = frame.row_mut(fy as u32);
        for fx in x0..x1 {
            let cov = mask_row[(fx - x) as usize];
            if cov == 0 {
                continue;
            }
            let eff = mul_div255(u16::from(cov), a);
            let i = fx as usize * 3;
            let out = over([row[i], row[i + 1], row[i + 2]], color, eff);
            row[i..i + 3].copy_from_slice(&out);
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_alpha_0_is_noop() {
        assert_eq!(over([1, 2, 3], Rgb8::WHITE, 0), [1, 2, 3]);
    }

    #[test]
    fn over_opaque_replaces_dst() {
        assert_eq!(over([9, 9, 9], Rgb8::new(255, 0, 0), 255), [255, 0, 0]);
    }

    #[test]
    fn over_half_black_halves_dst() {
        assert_eq!(over([200, 100, 0], Rgb8::BLACK, 128), [100, 50, 0]);
    }

    #[test]
    fn mask_is_clipped_to_frame() {
        let mut frame = RgbFrame::filled(4, 4, Rgb8::BLACK);
        let mask = CoverageMask {
            width: 3,
            height: 3,
            left: 0,
            top: 0,
            coverage: vec![255; 9],
        };
        mask_over_in_place(&mut frame, &mask, 2, -1, Rgb8::WHITE, 255);

        assert_eq!(frame.pixel(2, 0), Rgb8::WHITE);
        assert_eq!(frame.pixel(3, 1), Rgb8::WHITE);
        assert_eq!(frame.pixel(3, 2), Rgb8::BLACK);
        assert_eq!(frame.pixel(1, 0), Rgb8::BLACK);
    }

    #[test]
    fn mask_coverage_scales_alpha() {
        let mut frame = RgbFrame::filled(1, 1, Rgb8::BLACK);
        let mask = CoverageMask {
            width: 1,
            height: 1,
            left: 0,
            top: 0,
            coverage: vec![128],
        };
        mask_over_in_place(&mut frame, &mask, 0, 0, Rgb8::WHITE, 255);
        assert_eq!(frame.pixel(0, 0), Rgb8::new(128, 128, 128));
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(RgbFrame::from_raw(2, 2, vec![0; 11]).is_err());
        assert!(RgbFrame::from_raw(2, 2, vec![0; 12]).is_ok());
    }
}
