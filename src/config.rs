use std::path::Path;

use anyhow::Context as _;

use crate::{
    background::BackdropStyle,
    core::{CanvasConfig, Rgb8},
    error::{ReelError, ReelResult},
    text::{FontCandidate, default_font_candidates},
    timeline::TITLE_SECS,
};

/// Threading/chunking configuration for a render pass.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderThreading {
    pub parallel: bool,
    pub chunk_size: usize,
    pub threads: Option<usize>,
}

impl Default for RenderThreading {
    fn default() -> Self {
        Self {
            parallel: false,
            chunk_size: 64,
            threads: None,
        }
    }
}

/// Everything that styles and paces one video. Every field has a default, so a partial JSON
/// document only needs the fields it overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub canvas: CanvasConfig,
    pub text_display_secs: f64,
    pub title_secs: f64,
    pub title_font_px: u32,
    pub body_font_px: u32,
    pub text_color: Rgb8,
    /// Horizontal room left free around wrapped text, split between both sides.
    pub side_margin_px: u32,
    pub backdrop: BackdropStyle,
    pub fonts: Vec<FontCandidate>,
    pub threading: RenderThreading,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            text_display_secs: 3.0,
            title_secs: TITLE_SECS,
            title_font_px: 72,
            body_font_px: 48,
            text_color: Rgb8::WHITE,
            side_margin_px: 100,
            backdrop: BackdropStyle::default(),
            fonts: default_font_candidates(),
            threading: RenderThreading::default(),
        }
    }
}

impl VideoConfig {
    pub fn from_json_path(path: &Path) -> ReelResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .with_context(|| format!("parse config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReelResult<()> {
        self.canvas.validate()?;
        if !self.canvas.width.is_multiple_of(2) || !self.canvas.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "canvas width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        for (name, secs) in [
            ("text_display_secs", self.text_display_secs),
            ("title_secs", self.title_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ReelError::validation(format!(
                    "{name} must be finite and > 0"
                )));
            }
        }
        if self.title_font_px == 0 || self.body_font_px == 0 {
            return Err(ReelError::validation("font sizes must be > 0"));
        }
        if self.side_margin_px >= self.canvas.width {
            return Err(ReelError::validation(
                "side_margin_px must be smaller than the canvas width",
            ));
        }
        if self.fonts.is_empty() {
            return Err(ReelError::validation("font candidate list must not be empty"));
        }
        if self.threading.threads == Some(0) {
            return Err(ReelError::validation(
                "render threading 'threads' must be >= 1 when set",
            ));
        }
        Ok(())
    }

    /// Widest a wrapped line may be.
    pub fn max_text_width(&self) -> f32 {
        self.canvas.width.saturating_sub(self.side_margin_px) as f32
    }
}
