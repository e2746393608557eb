#![forbid(unsafe_code)]

pub mod background;
pub mod composite;
pub mod config;
pub mod core;
pub mod encode;
pub mod encode_ffmpeg;
pub mod encode_png;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod script;
pub mod text;
pub mod timeline;

pub use background::{BackdropStyle, BackgroundProvider, BackgroundSource, ImageRef};
pub use composite::{CoverageMask, RgbFrame};
pub use config::{RenderThreading, VideoConfig};
pub use core::{CanvasConfig, FrameIndex, FrameRange, Rgb8};
pub use encode::Encoder;
pub use encode_ffmpeg::{EncodeConfig, FfmpegEncoder, default_mp4_config, is_ffmpeg_on_path};
pub use encode_png::{PngSequenceEncoder, staged_frame_name};
pub use error::{ReelError, ReelResult};
pub use pipeline::{
    CancelFlag, FrameComposer, Pipeline, RenderStats, create_video, create_video_with_cancel,
    prepare,
};
pub use render::{RenderedFrame, render_text_frame};
pub use script::{Article, Script};
pub use text::{
    BuiltinFace, FontCandidate, FontSource, FontSpec, GlyphRasterizer, OutlineFace, Typeface,
    WrappedLine, layout_lines,
};
pub use timeline::{
    Envelope, FrameCursor, FrameSpec, RunState, Segment, SegmentRole, Timeline, TimelineBuilder,
};
