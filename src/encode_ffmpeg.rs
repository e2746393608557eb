use std::{
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    encode::Encoder,
    error::{ReelError, ReelResult},
    render::RenderedFrame,
};

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
    /// x264 preset, e.g. `fast`.
    pub preset: String,
    /// Target video bitrate in ffmpeg notation, e.g. `5000k`.
    pub bitrate: String,
}

impl EncodeConfig {
    pub fn validate(&self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::validation("encode width/height must be non-zero"));
        }
        if self.fps == 0 {
            return Err(ReelError::validation("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if self.preset.trim().is_empty() || self.bitrate.trim().is_empty() {
            return Err(ReelError::validation("encode preset/bitrate must be set"));
        }
        Ok(())
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![if self.overwrite { "-y" } else { "-n" }.to_string()];
        args.extend(
            [
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", self.width, self.height),
                "-r",
                &self.fps.to_string(),
                "-i",
                "pipe:0",
                "-an",
                "-c:v",
                "libx264",
                "-preset",
                &self.preset,
                "-b:v",
                &self.bitrate,
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]
            .map(str::to_string),
        );
        args.push(self.out_path.to_string_lossy().into_owned());
        args
    }
}

pub fn default_mp4_config(
    out_path: impl Into<PathBuf>,
    width: u32,
    height: u32,
    fps: u32,
) -> EncodeConfig {
    EncodeConfig {
        width,
        height,
        fps,
        out_path: out_path.into(),
        overwrite: true,
        preset: "fast".to_string(),
        bitrate: "5000k".to_string(),
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Pipes raw RGB24 frames into the system `ffmpeg` binary, which writes an H.264 MP4.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig) -> ReelResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(ReelError::validation(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(ReelError::encode(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut child = Command::new("ffmpeg")
            .args(cfg.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReelError::encode(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::encode("failed to open ffmpeg stdin"))?;

        tracing::debug!(out = %cfg.out_path.display(), "ffmpeg started");
        Ok(Self {
            cfg,
            child: Some(child),
            stdin: Some(stdin),
            frames_written: 0,
        })
    }

    pub fn config(&self) -> &EncodeConfig {
        &self.cfg
    }
}

impl Encoder for FfmpegEncoder {
    fn encode_frame(&mut self, frame: &RenderedFrame) -> ReelResult<()> {
        let px = &frame.pixels;
        if px.width != self.cfg.width || px.height != self.cfg.height {
            return Err(ReelError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                px.width, px.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.index.0 != self.frames_written {
            return Err(ReelError::encode(format!(
                "frame {} delivered out of order (expected {})",
                frame.index.0, self.frames_written
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::encode("ffmpeg encoder is already finalized"));
        };

        use std::io::Write as _;
        stdin
            .write_all(&px.data)
            .map_err(|e| ReelError::encode(format!("failed to write frame to ffmpeg stdin: {e}")))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> ReelResult<PathBuf> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| ReelError::encode("ffmpeg encoder is already finalized"))?;

        let output = child
            .wait_with_output()
            .map_err(|e| ReelError::encode(format!("failed to wait for ffmpeg to finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReelError::encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(
            out = %self.cfg.out_path.display(),
            frames = self.frames_written,
            "mp4 written"
        );
        Ok(self.cfg.out_path.clone())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if self.cfg.out_path.exists() && std::fs::remove_file(&self.cfg.out_path).is_err() {
            tracing::warn!(
                out = %self.cfg.out_path.display(),
                "could not remove partial output"
            );
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(default_mp4_config("out.mp4", 0, 10, 24).validate().is_err());
        assert!(default_mp4_config("out.mp4", 11, 10, 24).validate().is_err());
        assert!(default_mp4_config("out.mp4", 10, 10, 0).validate().is_err());
        assert!(default_mp4_config("out.mp4", 1280, 720, 24).validate().is_ok());

        let mut cfg = default_mp4_config("out.mp4", 10, 10, 24);
        cfg.bitrate.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn args_pipe_rgb24_into_x264() {
        let args = default_mp4_config("dir/clip.mp4", 1280, 720, 24).args();
        let joined = args.join(" ");
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert!(joined.contains("-pix_fmt rgb24 -s 1280x720 -r 24 -i pipe:0"));
        assert!(joined.contains("-an -c:v libx264 -preset fast -b:v 5000k"));
        assert!(joined.contains("-pix_fmt yuv420p -movflags +faststart"));
        assert_eq!(args.last().map(String::as_str), Some("dir/clip.mp4"));
    }

    #[test]
    fn no_overwrite_uses_dash_n() {
        let mut cfg = default_mp4_config("clip.mp4", 2, 2, 1);
        cfg.overwrite = false;
        assert_eq!(cfg.args()[0], "-n");
    }
}
