//! Background rasters: gradients and fitted images.
//!
//! Every handler returns a buffer of exactly the requested canvas size. Image problems
//! (missing file, undecodable bytes, remote references) are recovered here by falling back to
//! the default gradient; they never abort a pass.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;

use crate::{
    composite::{RgbFrame, fill_over_in_place},
    core::Rgb8,
    error::{ReelError, ReelResult},
};

pub const DEFAULT_GRADIENT_TOP: Rgb8 = Rgb8::new(30, 30, 50);
pub const DEFAULT_GRADIENT_BOTTOM: Rgb8 = Rgb8::new(21, 21, 100);

/// Where a background image comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageRef {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
    /// A URL. Fetching belongs to the caller; the core treats it as unavailable.
    Remote(String),
}

impl ImageRef {
    /// Classify a reference string as a URL or a local path.
    pub fn from_reference(reference: &str) -> Self {
        let trimmed = reference.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BackgroundSource {
    Gradient {
        top: Rgb8,
        bottom: Rgb8,
    },
    Image(ImageRef),
    /// The default gradient.
    #[default]
    None,
}

impl BackgroundSource {
    pub fn default_gradient() -> Self {
        Self::Gradient {
            top: DEFAULT_GRADIENT_TOP,
            bottom: DEFAULT_GRADIENT_BOTTOM,
        }
    }

    pub fn from_image_reference(reference: Option<&str>) -> Self {
        match reference {
            Some(r) if !r.trim().is_empty() => Self::Image(ImageRef::from_reference(r)),
            _ => Self::None,
        }
    }
}

/// Styling used when fitting images onto the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BackdropStyle {
    /// Fill around an image that does not cover the whole canvas.
    pub fill: Rgb8,
    /// Alpha of the uniform black overlay drawn over images; 0 disables it.
    pub overlay_alpha: u8,
    /// Gradient used for `BackgroundSource::None` and for every fallback.
    pub gradient_top: Rgb8,
    pub gradient_bottom: Rgb8,
}

impl Default for BackdropStyle {
    fn default() -> Self {
        Self {
            fill: Rgb8::new(30, 30, 50),
            overlay_alpha: 128,
            gradient_top: DEFAULT_GRADIENT_TOP,
            gradient_bottom: DEFAULT_GRADIENT_BOTTOM,
        }
    }
}

/// Resolves [`BackgroundSource`] values into canvas-sized rasters.
#[derive(Clone, Debug, Default)]
pub struct BackgroundProvider {
    style: BackdropStyle,
}

impl BackgroundProvider {
    pub fn new(style: BackdropStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &BackdropStyle {
        &self.style
    }

    pub fn resolve(&self, source: &BackgroundSource, width: u32, height: u32) -> RgbFrame {
        match source {
            BackgroundSource::Gradient { top, bottom } => gradient(*top, *bottom, width, height),
            BackgroundSource::None => self.fallback(width, height),
            BackgroundSource::Image(image_ref) => {
                match self.fit_image(image_ref, width, height) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(
                            image = %describe(image_ref),
                            error = %err,
                            "background image unavailable, using default gradient"
                        );
                        self.fallback(width, height)
                    }
                }
            }
        }
    }

    fn fallback(&self, width: u32, height: u32) -> RgbFrame {
        gradient(self.style.gradient_top, self.style.gradient_bottom, width, height)
    }

    fn fit_image(&self, image_ref: &ImageRef, width: u32, height: u32) -> ReelResult<RgbFrame> {
        let img = load_image(image_ref)?;
        let mut frame = fit_to_canvas(&img, width, height, self.style.fill);
        fill_over_in_place(&mut frame, Rgb8::BLACK, self.style.overlay_alpha);
        Ok(frame)
    }
}

fn describe(image_ref: &ImageRef) -> String {
    match image_ref {
        ImageRef::Path(p) => p.display().to_string(),
        ImageRef::Bytes(b) => format!("<{} bytes>", b.len()),
        ImageRef::Remote(url) => url.clone(),
    }
}

fn load_image(image_ref: &ImageRef) -> ReelResult<image::RgbImage> {
    let img = match image_ref {
        ImageRef::Path(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read background image '{}'", path.display()))?;
            image::load_from_memory(&bytes).context("decode background image")?
        }
        ImageRef::Bytes(bytes) => {
            image::load_from_memory(bytes).context("decode background image from memory")?
        }
        ImageRef::Remote(url) => {
            return Err(ReelError::resource(format!(
                "remote image '{url}' must be fetched by the caller"
            )));
        }
    };
    Ok(img.to_rgb8())
}

/// Vertical blend from `top` at row 0 toward `bottom`, with `t = y / height`.
pub fn gradient(top: Rgb8, bottom: Rgb8, width: u32, height: u32) -> RgbFrame {
    let mut frame = RgbFrame::filled(width, height, top);
    let (top, bottom) = (top.to_array(), bottom.to_array());
    for y in 0..height {
        let t = f64::from(y) / f64::from(height);
        let mut color = [0u8; 3];
        for i in 0..3 {
            let a = f64::from(top[i]);
            let b = f64::from(bottom[i]);
            color[i] = (a + (b - a) * t).round().clamp(0.0, 255.0) as u8;
        }
        for px in frame.row_mut(y).chunks_exact_mut(3) {
            px.copy_from_slice(&color);
        }
    }
    frame
}

/// Downscale (never upscale) preserving aspect ratio so the image fits inside the canvas, then
/// center it on a `fill` colored canvas.
pub fn fit_to_canvas(img: &image::RgbImage, width: u32, height: u32, fill: Rgb8) -> RgbFrame {
    let (iw, ih) = img.dimensions();
    let mut frame = RgbFrame::filled(width, height, fill);
    if iw == 0 || ih == 0 {
        return frame;
    }

    let (fw, fh) = fitted_size(iw, ih, width, height);
    let resized;
    let src = if (fw, fh) == (iw, ih) {
        img
    } else {
        resized = image::imageops::resize(img, fw, fh, image::imageops::FilterType::Lanczos3);
        &resized
    };

    let x0 = (width - fw) / 2;
    let y0 = (height - fh) / 2;
    for y in 0..fh {
        let row = frame.row_mut(y0 + y);
        for x in 0..fw {
            let p = src.get_pixel(x, y).0;
            let i = ((x0 + x) * 3) as usize;
            row[i..i + 3].copy_from_slice(&p);
        }
    }
    frame
}

/// Largest size with the image's aspect ratio that fits `max_w`×`max_h` without growing.
pub fn fitted_size(iw: u32, ih: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if iw <= max_w && ih <= max_h {
        return (iw, ih);
    }
    let scale = (f64::from(max_w) / f64::from(iw)).min(f64::from(max_h) / f64::from(ih));
    let w = ((f64::from(iw) * scale).round() as u32).clamp(1, max_w);
    let h = ((f64::from(ih) * scale).round() as u32).clamp(1, max_h);
    (w, h)
}
