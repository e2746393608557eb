use std::{collections::HashMap, sync::Arc};

use crate::{
    composite::CoverageMask,
    error::{ReelError, ReelResult},
    text::{GlyphRasterizer, Typeface},
};

/// Last-resort typeface that needs no font file: every character advances by a fixed amount
/// and every non-whitespace character is drawn as a solid block.
///
/// Output is legible only as word shapes, but it keeps a pass alive on hosts without any
/// usable font and is fully deterministic, which also makes it the typeface of choice in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinFace;

impl Typeface for BuiltinFace {
    fn name(&self) -> &str {
        "builtin-block"
    }

    fn rasterizer(&self, size_px: u32) -> ReelResult<Box<dyn GlyphRasterizer + Send>> {
        Ok(Box::new(BlockRasterizer::new(size_px)?))
    }
}

/// Metrics are integer fractions of the pixel size:
/// advance `0.6`, block width `0.5`, block spans `0.2..0.9` of the em box vertically.
pub(crate) struct BlockRasterizer {
    size_px: u32,
    advance: u32,
    block_w: u32,
    block_top: u32,
    block_bottom: u32,
    cache: HashMap<String, Arc<CoverageMask>>,
}

impl BlockRasterizer {
    pub(crate) fn new(size_px: u32) -> ReelResult<Self> {
        if size_px == 0 {
            return Err(ReelError::validation("font size_px must be > 0"));
        }
        let frac = |num: u32| (size_px * num).div_ceil(10);
        Ok(Self {
            size_px,
            advance: frac(6),
            block_w: frac(5),
            block_top: size_px * 2 / 10,
            block_bottom: frac(9),
            cache: HashMap::new(),
        })
    }

    fn width_of(&self, text: &str) -> u32 {
        text.chars().count() as u32 * self.advance
    }
}

impl GlyphRasterizer for BlockRasterizer {
    fn size_px(&self) -> u32 {
        self.size_px
    }

    fn measure(&mut self, text: &str) -> ReelResult<f32> {
        Ok(self.width_of(text) as f32)
    }

    fn rasterize(&mut self, text: &str) -> ReelResult<Arc<CoverageMask>> {
        if let Some(mask) = self.cache.get(text) {
            return Ok(mask.clone());
        }

        let width = self.width_of(text);
        let height = self.block_bottom;
        if width == 0 || height == 0 {
            return Ok(Arc::new(CoverageMask::empty()));
        }

        let mut coverage = vec![0u8; width as usize * height as usize];
        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let x0 = i as u32 * self.advance;
            for y in self.block_top..self.block_bottom {
                let row = y as usize * width as usize;
                let start = row + x0 as usize;
                coverage[start..start + self.block_w as usize].fill(255);
            }
        }

        let mask = Arc::new(CoverageMask {
            width,
            height,
            left: 0,
            top: 0,
            coverage,
        });
        if self.cache.len() >= 64 {
            self.cache.clear();
        }
        self.cache.insert(text.to_string(), mask.clone());
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_scale_with_size() {
        let mut r = BlockRasterizer::new(10).unwrap();
        assert_eq!(r.measure("abc").unwrap(), 18.0);
        assert_eq!(r.measure("a b").unwrap(), 18.0);

        let mut r = BlockRasterizer::new(48).unwrap();
        assert_eq!(r.measure("ab").unwrap(), 58.0);
    }

    #[test]
    fn spaces_are_blank_and_glyphs_are_solid() {
        let mut r = BlockRasterizer::new(10).unwrap();
        let mask = r.rasterize("a b").unwrap();
        assert_eq!((mask.width, mask.height), (18, 9));

        let at = |x: usize, y: usize| mask.coverage[y * mask.width as usize + x];
        assert_eq!(at(0, 5), 255);
        assert_eq!(at(4, 5), 255);
        assert_eq!(at(5, 5), 0);
        assert_eq!(at(7, 5), 0);
        assert_eq!(at(12, 5), 255);
        assert_eq!(at(0, 1), 0);
    }

    #[test]
    fn rasterize_is_cached_and_deterministic() {
        let mut r = BlockRasterizer::new(24).unwrap();
        let a = r.rasterize("hello").unwrap();
        let b = r.rasterize("hello").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut fresh = BlockRasterizer::new(24).unwrap();
        assert_eq!(*fresh.rasterize("hello").unwrap(), *a);
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(BuiltinFace.rasterizer(0).is_err());
    }
}
