use std::{collections::HashMap, sync::Arc};

use crate::{
    composite::CoverageMask,
    error::{ReelError, ReelResult},
    text::{GlyphRasterizer, Typeface},
};

/// Margin around rasterized runs so overhanging glyphs keep their edges.
const MASK_PAD: u32 = 4;
const MASK_CACHE_CAPACITY: usize = 64;
const MASK_TILE_WIDTH: u16 = 4096;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct MaskBrush;

/// An outline (TrueType/OpenType) font loaded from bytes.
#[derive(Clone)]
pub struct OutlineFace {
    family: String,
    bytes: Arc<Vec<u8>>,
    index: u32,
}

impl std::fmt::Debug for OutlineFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutlineFace")
            .field("family", &self.family)
            .field("bytes", &self.bytes.len())
            .field("index", &self.index)
            .finish()
    }
}

impl OutlineFace {
    /// Validate that `bytes` holds at least one font family parley can register.
    pub fn from_bytes(bytes: Arc<Vec<u8>>, index: u32) -> ReelResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let family = register_family(&mut font_ctx, &bytes)?;
        Ok(Self {
            family,
            bytes,
            index,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }
}

impl Typeface for OutlineFace {
    fn name(&self) -> &str {
        &self.family
    }

    fn rasterizer(&self, size_px: u32) -> ReelResult<Box<dyn GlyphRasterizer + Send>> {
        Ok(Box::new(TextShaper::new(self, size_px)?))
    }
}

fn register_family(font_ctx: &mut parley::FontContext, bytes: &[u8]) -> ReelResult<String> {
    let families = font_ctx
        .collection
        .register_fonts(parley::fontique::Blob::from(bytes.to_vec()), None);
    let family_id = families
        .first()
        .map(|(id, _)| *id)
        .ok_or_else(|| ReelError::resource("no font families registered from font bytes"))?;

    Ok(font_ctx
        .collection
        .family_name(family_id)
        .ok_or_else(|| ReelError::resource("registered font family has no name"))?
        .to_string())
}

/// Parley shaping plus vello_cpu glyph rasterization for one face at one size.
pub struct TextShaper {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<MaskBrush>,
    family: String,
    font: vello_cpu::peniko::FontData,
    size_px: u32,
    masks: HashMap<String, Arc<CoverageMask>>,
}

impl TextShaper {
    pub fn new(face: &OutlineFace, size_px: u32) -> ReelResult<Self> {
        if size_px == 0 {
            return Err(ReelError::validation("font size_px must be > 0"));
        }
        let mut font_ctx = parley::FontContext::default();
        let family = register_family(&mut font_ctx, &face.bytes)?;
        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(face.bytes.as_ref().clone()),
            face.index,
        );
        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family,
            font,
            size_px,
            masks: HashMap::new(),
        })
    }

    fn layout(&mut self, text: &str) -> parley::Layout<MaskBrush> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(self.size_px as f32));
        builder.push_default(parley::style::StyleProperty::Brush(MaskBrush));

        let mut layout: parley::Layout<MaskBrush> = builder.build(text);
        layout.break_all_lines(None);
        layout
    }
}

impl GlyphRasterizer for TextShaper {
    fn size_px(&self) -> u32 {
        self.size_px
    }

    fn measure(&mut self, text: &str) -> ReelResult<f32> {
        if text.is_empty() {
            return Ok(0.0);
        }
        Ok(self.layout(text).width())
    }

    fn rasterize(&mut self, text: &str) -> ReelResult<Arc<CoverageMask>> {
        if let Some(mask) = self.masks.get(text) {
            return Ok(mask.clone());
        }
        if text.trim().is_empty() {
            return Ok(Arc::new(CoverageMask::empty()));
        }

        let layout = self.layout(text);
        let width = layout.full_width().ceil().max(0.0) as u32 + 2 * MASK_PAD;
        let height = layout.height().ceil().max(0.0) as u32 + 2 * MASK_PAD;
        let h16: u16 = height
            .try_into()
            .map_err(|_| ReelError::validation("text run height exceeds u16"))?;

        let pad = MASK_PAD as f32;
        let mut runs = Vec::new();
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let glyphs: Vec<vello_cpu::Glyph> = run
                    .positioned_glyphs()
                    .map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x + pad,
                        y: g.y + pad,
                    })
                    .collect();
                runs.push((run.run().font_size(), glyphs));
            }
        }

        // Runs wider than one pixmap are rasterized in tiles. Glyphs are kept for a tile when
        // their origin lies within `reach` of it.
        let reach = 2.0 * self.size_px as f32;
        let row_len = width as usize;
        let mut coverage = vec![0u8; row_len * height as usize];
        let mut tile_x = 0u32;
        while tile_x < width {
            let tile_w = (width - tile_x).min(u32::from(MASK_TILE_WIDTH));
            let (left, right) = (tile_x as f32 - reach, (tile_x + tile_w) as f32 + reach);

            let mut ctx = vello_cpu::RenderContext::new(tile_w as u16, h16);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
            for (font_size, glyphs) in &runs {
                let visible = glyphs
                    .iter()
                    .filter(|g| g.x >= left && g.x <= right)
                    .map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x - tile_x as f32,
                        y: g.y,
                    });
                ctx.glyph_run(&self.font)
                    .font_size(*font_size)
                    .fill_glyphs(visible);
            }
            ctx.flush();
            let mut pixmap = vello_cpu::Pixmap::new(tile_w as u16, h16);
            ctx.render_to_pixmap(&mut pixmap);

            // Premultiplied white: the alpha channel is the coverage.
            let tile = pixmap.data_as_u8_slice();
            let tile_row = tile_w as usize * 4;
            for (y, src) in tile.chunks_exact(tile_row).enumerate() {
                let at = y * row_len + tile_x as usize;
                for (dst, px) in coverage[at..at + tile_w as usize]
                    .iter_mut()
                    .zip(src.chunks_exact(4))
                {
                    *dst = px[3];
                }
            }
            tile_x += tile_w;
        }

        let mask = Arc::new(CoverageMask {
            width,
            height,
            left: -(MASK_PAD as i32),
            top: -(MASK_PAD as i32),
            coverage,
        });
        if self.masks.len() >= MASK_CACHE_CAPACITY {
            self.masks.clear();
        }
        self.masks.insert(text.to_string(), mask.clone());
        Ok(mask)
    }
}
