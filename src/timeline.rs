//! Sequencing a script into per-frame descriptions ([`FrameSpec`]).
//!
//! [`TimelineBuilder::build`] turns an article title and a validated [`Script`] into a
//! [`Timeline`]: an ordered list of segments, each owning a contiguous, pre-assigned range of
//! global frame indices. Frame descriptions are produced lazily, either in order through
//! [`Timeline::frames`] or by index through [`Timeline::frame_at`] when frames are rendered
//! out of order.

use std::sync::Arc;

use crate::{
    background::BackgroundSource,
    core::{CanvasConfig, FrameIndex, FrameRange},
    error::{ReelError, ReelResult},
    script::Script,
};

/// Fixed on-screen time of the title segment.
pub const TITLE_SECS: f64 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SegmentRole {
    Title,
    Body,
}

impl SegmentRole {
    pub fn envelope(self) -> Envelope {
        match self {
            Self::Title => Envelope::FadeIn,
            Self::Body => Envelope::FadeInOut,
        }
    }
}

/// Opacity over segment progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// Linear ramp reaching full opacity at one third of the segment.
    FadeIn,
    /// Linear ramp over the first 20%, hold, linear ramp down over the last 20%.
    FadeInOut,
}

impl Envelope {
    pub fn opacity(self, progress: f64) -> f32 {
        let p = progress.clamp(0.0, 1.0);
        let o = match self {
            Self::FadeIn => (p * 3.0).min(1.0),
            Self::FadeInOut => {
                if p < 0.2 {
                    p / 0.2
                } else if p > 0.8 {
                    (1.0 - p) / 0.2
                } else {
                    1.0
                }
            }
        };
        o.clamp(0.0, 1.0) as f32
    }

    /// Opacity of frame `frame_in_segment` out of `frames_in_segment`.
    pub fn opacity_at(self, frame_in_segment: u64, frames_in_segment: u64) -> f32 {
        if frames_in_segment == 0 {
            return 0.0;
        }
        self.opacity(frame_in_segment as f64 / frames_in_segment as f64)
    }
}

/// One text unit of the video, mapped to a contiguous run of frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub text: Arc<str>,
    pub role: SegmentRole,
    pub duration_secs: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedSegment {
    pub segment: Segment,
    pub background: BackgroundSource,
    pub frames: FrameRange,
}

impl PlannedSegment {
    pub fn frames_in_segment(&self) -> u64 {
        self.frames.len_frames()
    }
}

/// Fully resolved description of one frame, prior to rasterization.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSpec {
    pub index: FrameIndex,
    pub segment_index: usize,
    pub frame_in_segment: u64,
    pub opacity: f32,
    pub text: Arc<str>,
    pub role: SegmentRole,
    pub background: BackgroundSource,
}

#[derive(Clone, Debug)]
pub struct TimelineBuilder {
    canvas: CanvasConfig,
    text_display_secs: f64,
    title_secs: f64,
    title_background: BackgroundSource,
    body_background: BackgroundSource,
}

impl TimelineBuilder {
    pub fn new(canvas: CanvasConfig, text_display_secs: f64) -> Self {
        Self {
            canvas,
            text_display_secs,
            title_secs: TITLE_SECS,
            title_background: BackgroundSource::None,
            body_background: BackgroundSource::None,
        }
    }

    pub fn with_title_secs(mut self, secs: f64) -> Self {
        self.title_secs = secs;
        self
    }

    pub fn with_title_background(mut self, background: BackgroundSource) -> Self {
        self.title_background = background;
        self
    }

    pub fn with_body_background(mut self, background: BackgroundSource) -> Self {
        self.body_background = background;
        self
    }

    /// Sequence `[title] + [hook] + segments + [conclusion]`, skipping blank entries, and
    /// assign each segment its range of global frame indices.
    pub fn build(&self, title: &str, script: &Script) -> ReelResult<Timeline> {
        self.canvas.validate()?;
        for secs in [self.text_display_secs, self.title_secs] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ReelError::validation(
                    "segment durations must be finite and > 0",
                ));
            }
        }
        if script.body_len() == 0 {
            return Err(ReelError::EmptyScript);
        }

        let title = (!title.trim().is_empty()).then(|| Segment {
            text: Arc::from(title),
            role: SegmentRole::Title,
            duration_secs: self.title_secs,
        });
        let body = script.body_entries().map(|text| Segment {
            text: Arc::from(text),
            role: SegmentRole::Body,
            duration_secs: self.text_display_secs,
        });

        let mut segments = Vec::with_capacity(script.body_len() + 1);
        let mut next = 0u64;
        for segment in title.into_iter().chain(body) {
            let n = self.canvas.frames_for_secs(segment.duration_secs);
            let frames = FrameRange::new(FrameIndex(next), FrameIndex(next + n))?;
            next += n;
            let background = match segment.role {
                SegmentRole::Title => self.title_background.clone(),
                SegmentRole::Body => self.body_background.clone(),
            };
            segments.push(PlannedSegment {
                segment,
                background,
                frames,
            });
        }

        tracing::debug!(
            segments = segments.len(),
            total_frames = next,
            fps = self.canvas.fps,
            "timeline built"
        );
        Ok(Timeline {
            canvas: self.canvas,
            segments,
            total_frames: next,
        })
    }
}

/// The sequenced script: segments with their pre-assigned frame ranges.
#[derive(Clone, Debug)]
pub struct Timeline {
    canvas: CanvasConfig,
    segments: Vec<PlannedSegment>,
    total_frames: u64,
}

impl Timeline {
    pub fn canvas(&self) -> CanvasConfig {
        self.canvas
    }

    pub fn segments(&self) -> &[PlannedSegment] {
        &self.segments
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn range(&self) -> FrameRange {
        FrameRange {
            start: FrameIndex(0),
            end: FrameIndex(self.total_frames),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / f64::from(self.canvas.fps)
    }

    /// Frame descriptions in ascending index order, starting from a fresh cursor.
    pub fn frames(&self) -> FrameSpecs<'_> {
        FrameSpecs {
            timeline: self,
            cursor: FrameCursor::default(),
        }
    }

    /// Description of the frame at `index`, independent of any cursor.
    pub fn frame_at(&self, index: FrameIndex) -> Option<FrameSpec> {
        if index.0 >= self.total_frames {
            return None;
        }
        let segment_index = self
            .segments
            .partition_point(|s| s.frames.end.0 <= index.0);
        let planned = self.segments.get(segment_index)?;
        Some(self.spec(segment_index, planned, index.0 - planned.frames.start.0))
    }

    fn spec(&self, segment_index: usize, planned: &PlannedSegment, frame_in_segment: u64) -> FrameSpec {
        let n = planned.frames_in_segment();
        FrameSpec {
            index: FrameIndex(planned.frames.start.0 + frame_in_segment),
            segment_index,
            frame_in_segment,
            opacity: planned.segment.role.envelope().opacity_at(frame_in_segment, n),
            text: planned.segment.text.clone(),
            role: planned.segment.role,
            background: planned.background.clone(),
        }
    }
}

/// Position of the next frame to emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCursor {
    pub segment_index: usize,
    pub frame_in_segment: u64,
}

/// Lazy, in-order iterator over a timeline's frames.
pub struct FrameSpecs<'a> {
    timeline: &'a Timeline,
    cursor: FrameCursor,
}

impl FrameSpecs<'_> {
    pub fn cursor(&self) -> FrameCursor {
        self.cursor
    }
}

impl Iterator for FrameSpecs<'_> {
    type Item = FrameSpec;

    fn next(&mut self) -> Option<FrameSpec> {
        loop {
            let planned = self.timeline.segments.get(self.cursor.segment_index)?;
            if self.cursor.frame_in_segment < planned.frames_in_segment() {
                let spec = self.timeline.spec(
                    self.cursor.segment_index,
                    planned,
                    self.cursor.frame_in_segment,
                );
                self.cursor.frame_in_segment += 1;
                return Some(spec);
            }
            self.cursor.segment_index += 1;
            self.cursor.frame_in_segment = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let emitted = self
            .timeline
            .segments
            .get(self.cursor.segment_index)
            .map(|s| s.frames.start.0 + self.cursor.frame_in_segment)
            .unwrap_or(self.timeline.total_frames);
        let left = self.timeline.total_frames.saturating_sub(emitted) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FrameSpecs<'_> {}

/// Progress of one render pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RunState {
    #[default]
    Idle,
    Sequencing {
        segment_index: usize,
        frame_in_segment: u64,
    },
    Done,
    Aborted(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted(_))
    }
}
