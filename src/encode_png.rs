use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    encode::Encoder,
    error::{ReelError, ReelResult},
    render::RenderedFrame,
};

/// File name of a staged frame: the zero-padded global index.
pub fn staged_frame_name(index: u64) -> String {
    format!("{index:06}.png")
}

/// Stages every frame as `{index:06}.png` inside one directory.
///
/// Any `*.png` already in the directory is removed on construction, so the directory only ever
/// holds the frames of one run. Staged files are removed on `abort`, and on `finish` as well when
/// `keep_on_finish` is false.
#[derive(Debug)]
pub struct PngSequenceEncoder {
    dir: PathBuf,
    staged: Vec<PathBuf>,
    keep_on_finish: bool,
    finished: bool,
}

impl PngSequenceEncoder {
    pub fn new(dir: impl Into<PathBuf>) -> ReelResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create frame directory '{}'", dir.display()))?;
        clear_stale_frames(&dir)?;
        Ok(Self {
            dir,
            staged: Vec::new(),
            keep_on_finish: true,
            finished: false,
        })
    }

    pub fn keep_on_finish(mut self, keep: bool) -> Self {
        self.keep_on_finish = keep;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn staged(&self) -> &[PathBuf] {
        &self.staged
    }

    fn cleanup(&mut self) {
        for path in self.staged.drain(..) {
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %err, "could not remove staged frame");
            }
        }
    }
}

fn clear_stale_frames(dir: &Path) -> ReelResult<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list frame directory '{}'", dir.display()))?;
    let mut removed = 0usize;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list frame directory '{}'", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "png") {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove stale frame '{}'", path.display()))?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "cleared stale frames");
    }
    Ok(())
}

impl Encoder for PngSequenceEncoder {
    fn encode_frame(&mut self, frame: &RenderedFrame) -> ReelResult<()> {
        if self.finished {
            return Err(ReelError::encode("png sequence is already finalized"));
        }
        let expected = self.staged.len() as u64;
        if frame.index.0 != expected {
            return Err(ReelError::encode(format!(
                "frame {} delivered out of order (expected {expected})",
                frame.index.0
            )));
        }

        let px = &frame.pixels;
        let img = image::RgbImage::from_raw(px.width, px.height, px.data.clone())
            .ok_or_else(|| ReelError::encode("frame buffer does not match its dimensions"))?;
        let path = self.dir.join(staged_frame_name(frame.index.0));
        img.save(&path)
            .map_err(|e| ReelError::encode(format!("write '{}': {e}", path.display())))?;
        self.staged.push(path);
        Ok(())
    }

    fn finish(&mut self) -> ReelResult<PathBuf> {
        self.finished = true;
        tracing::info!(
            dir = %self.dir.display(),
            frames = self.staged.len(),
            "png sequence staged"
        );
        if !self.keep_on_finish {
            self.cleanup();
        }
        Ok(self.dir.clone())
    }

    fn abort(&mut self) {
        self.finished = true;
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{composite::RgbFrame, core::FrameIndex, core::Rgb8};

    fn frame(i: u64) -> RenderedFrame {
        RenderedFrame {
            index: FrameIndex(i),
            pixels: RgbFrame::filled(4, 2, Rgb8::new(10, 20, 30)),
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("newsreel_png_{tag}_{}", std::process::id()))
    }

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(staged_frame_name(0), "000000.png");
        assert_eq!(staged_frame_name(503), "000503.png");
    }

    #[test]
    fn stages_frames_and_cleans_up_on_abort() {
        let dir = temp_dir("abort");
        let mut enc = PngSequenceEncoder::new(&dir).unwrap();
        enc.encode_frame(&frame(0)).unwrap();
        enc.encode_frame(&frame(1)).unwrap();
        assert!(dir.join("000001.png").is_file());

        let decoded = image::open(dir.join("000000.png")).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(3, 1).0, [10, 20, 30]);

        enc.abort();
        assert!(!dir.join("000000.png").exists());
        assert!(!dir.join("000001.png").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn construction_clears_earlier_pngs_only() {
        let dir = temp_dir("stale");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("000042.png"), b"old").unwrap();
        std::fs::write(dir.join("notes.txt"), b"keep").unwrap();

        let enc = PngSequenceEncoder::new(&dir).unwrap();
        assert!(enc.staged().is_empty());
        assert!(!dir.join("000042.png").exists());
        assert!(dir.join("notes.txt").is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_gaps_in_the_sequence() {
        let dir = temp_dir("gap");
        let mut enc = PngSequenceEncoder::new(&dir).unwrap();
        let err = enc.encode_frame(&frame(1)).unwrap_err();
        assert!(matches!(err, ReelError::Encode(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn finish_can_discard_staged_frames() {
        let dir = temp_dir("discard");
        let mut enc = PngSequenceEncoder::new(&dir).unwrap().keep_on_finish(false);
        enc.encode_frame(&frame(0)).unwrap();
        assert_eq!(enc.finish().unwrap(), dir);
        assert!(!dir.join("000000.png").exists());
        assert!(enc.encode_frame(&frame(1)).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
