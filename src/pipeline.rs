use std::{
    collections::{HashMap, hash_map::Entry},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use rayon::prelude::*;

use crate::{
    background::{BackgroundProvider, BackgroundSource},
    composite::RgbFrame,
    config::{RenderThreading, VideoConfig},
    core::{CanvasConfig, FrameIndex, FrameRange},
    encode::Encoder,
    error::{ReelError, ReelResult},
    render::{RenderedFrame, render_text_frame},
    script::{Article, Script},
    text::{FontSource, FontSpec, GlyphRasterizer, Typeface, WrappedLine, layout_lines},
    timeline::{FrameSpec, RunState, SegmentRole, Timeline, TimelineBuilder},
};

/// Shared cancellation request, checked between frame submissions.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_total: u64,
    pub frames_delivered: u64,
    pub chunks: u64,
    pub backgrounds_resolved: u64,
}

/// Read-only state shared by every rendering worker: fonts, wrap width and the backgrounds of
/// the timeline, each resolved once per distinct source.
#[derive(Debug)]
pub struct FrameComposer {
    canvas: CanvasConfig,
    title_font: FontSpec,
    body_font: FontSpec,
    max_text_width: f32,
    backgrounds: HashMap<BackgroundSource, Arc<RgbFrame>>,
}

impl FrameComposer {
    pub fn new(timeline: &Timeline, config: &VideoConfig, face: Arc<dyn Typeface>) -> Self {
        let canvas = timeline.canvas();
        let provider = BackgroundProvider::new(config.backdrop);
        let mut backgrounds = HashMap::new();
        for planned in timeline.segments() {
            backgrounds
                .entry(planned.background.clone())
                .or_insert_with(|| {
                    Arc::new(provider.resolve(&planned.background, canvas.width, canvas.height))
                });
        }

        Self {
            canvas,
            title_font: FontSpec::new(face.clone(), config.title_font_px, config.text_color),
            body_font: FontSpec::new(face, config.body_font_px, config.text_color),
            max_text_width: config.max_text_width(),
            backgrounds,
        }
    }

    pub fn background_count(&self) -> usize {
        self.backgrounds.len()
    }

    /// Open per-worker rasterizers for the title and body sizes.
    pub fn worker(&self) -> ReelResult<ComposerWorker<'_>> {
        Ok(ComposerWorker {
            composer: self,
            title: self.title_font.face.rasterizer(self.title_font.size_px)?,
            body: self.body_font.face.rasterizer(self.body_font.size_px)?,
            layouts: HashMap::new(),
        })
    }
}

/// Mutable shaping state of one rendering worker.
pub struct ComposerWorker<'a> {
    composer: &'a FrameComposer,
    title: Box<dyn GlyphRasterizer + Send>,
    body: Box<dyn GlyphRasterizer + Send>,
    layouts: HashMap<usize, Vec<WrappedLine>>,
}

impl ComposerWorker<'_> {
    pub fn render(&mut self, spec: &FrameSpec) -> ReelResult<RenderedFrame> {
        let composer = self.composer;
        let background = composer.backgrounds.get(&spec.background).ok_or_else(|| {
            ReelError::validation(format!(
                "frame {} refers to a background outside its timeline",
                spec.index.0
            ))
        })?;

        let (font, color) = match spec.role {
            SegmentRole::Title => (self.title.as_mut(), composer.title_font.color),
            SegmentRole::Body => (self.body.as_mut(), composer.body_font.color),
        };

        let lines = match self.layouts.entry(spec.segment_index) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(layout_lines(
                &spec.text,
                composer.max_text_width,
                composer.canvas.width,
                &mut *font,
            )?),
        };

        let pixels = render_text_frame(background, lines.as_slice(), font, color, spec.opacity)?;
        Ok(RenderedFrame {
            index: spec.index,
            pixels,
        })
    }
}

/// Drives a timeline through the renderer and into an encoder, in ascending index order.
#[derive(Debug)]
pub struct Pipeline {
    timeline: Timeline,
    composer: FrameComposer,
    threading: RenderThreading,
    cancel: CancelFlag,
    state: RunState,
}

impl Pipeline {
    pub fn new(timeline: Timeline, config: &VideoConfig, face: Arc<dyn Typeface>) -> Self {
        let composer = FrameComposer::new(&timeline, config, face);
        Self {
            timeline,
            composer,
            threading: config.threading.clone(),
            cancel: CancelFlag::new(),
            state: RunState::Idle,
        }
    }

    pub fn with_threading(mut self, threading: RenderThreading) -> Self {
        self.threading = threading;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Render one frame by index, independent of any run.
    pub fn render_frame(&self, index: FrameIndex) -> ReelResult<RenderedFrame> {
        let spec = self.timeline.frame_at(index).ok_or_else(|| {
            ReelError::validation(format!(
                "frame {} is outside the timeline (0..{})",
                index.0,
                self.timeline.total_frames()
            ))
        })?;
        self.composer.worker()?.render(&spec)
    }

    /// Render every frame and hand it to `encoder`. On any failure the encoder is aborted and
    /// the run ends in [`RunState::Aborted`].
    #[tracing::instrument(skip(self, encoder), fields(frames = self.timeline.total_frames()))]
    pub fn run(&mut self, encoder: &mut dyn Encoder) -> ReelResult<(PathBuf, RenderStats)> {
        if self.state.is_terminal() {
            return Err(ReelError::validation("pipeline has already run"));
        }
        self.state = RunState::Sequencing {
            segment_index: 0,
            frame_in_segment: 0,
        };

        let mut stats = RenderStats {
            frames_total: self.timeline.total_frames(),
            backgrounds_resolved: self.composer.background_count() as u64,
            ..RenderStats::default()
        };
        let result = self
            .deliver_all(encoder, &mut stats)
            .and_then(|()| encoder.finish());

        match result {
            Ok(path) => {
                self.state = RunState::Done;
                tracing::info!(
                    frames = stats.frames_delivered,
                    out = %path.display(),
                    "render finished"
                );
                Ok((path, stats))
            }
            Err(err) => {
                encoder.abort();
                tracing::warn!(
                    error = %err,
                    delivered = stats.frames_delivered,
                    "render aborted"
                );
                self.state = RunState::Aborted(err.to_string());
                Err(err)
            }
        }
    }

    fn deliver_all(&mut self, encoder: &mut dyn Encoder, stats: &mut RenderStats) -> ReelResult<()> {
        let range = self.timeline.range();
        let chunk_size = normalized_chunk_size(self.threading.chunk_size);
        let pool = if self.threading.parallel {
            Some(build_thread_pool(self.threading.threads)?)
        } else {
            None
        };
        let mut sequential_worker = match pool {
            Some(_) => None,
            None => Some(self.composer.worker()?),
        };

        let mut chunk_start = range.start.0;
        while chunk_start < range.end.0 {
            let chunk_end = (chunk_start + chunk_size).min(range.end.0);
            let chunk = FrameRange::new(FrameIndex(chunk_start), FrameIndex(chunk_end))?;
            let specs = self.chunk_specs(chunk)?;

            let frames: Vec<ReelResult<RenderedFrame>> = match (&pool, &mut sequential_worker) {
                (Some(pool), _) => render_chunk_parallel(&self.composer, &specs, pool),
                (None, Some(worker)) => {
                    // Stop rendering the chunk at the first failure or cancellation.
                    let mut out = Vec::with_capacity(specs.len());
                    for spec in &specs {
                        if self.cancel.is_cancelled() {
                            return Err(ReelError::Cancelled(spec.index.0));
                        }
                        let frame = worker.render(spec);
                        let failed = frame.is_err();
                        out.push(frame);
                        if failed {
                            break;
                        }
                    }
                    out
                }
                (None, None) => {
                    return Err(ReelError::validation("no rendering worker available"));
                }
            };

            for (spec, frame) in specs.iter().zip(frames) {
                if self.cancel.is_cancelled() {
                    return Err(ReelError::Cancelled(spec.index.0));
                }
                let frame = frame.map_err(|e| as_pass_failure(e, spec.index))?;
                encoder
                    .encode_frame(&frame)
                    .map_err(|e| as_pass_failure(e, spec.index))?;
                stats.frames_delivered += 1;
                self.state = RunState::Sequencing {
                    segment_index: spec.segment_index,
                    frame_in_segment: spec.frame_in_segment,
                };
            }

            stats.chunks += 1;
            tracing::debug!(
                start = chunk.start.0,
                end = chunk.end.0,
                delivered = stats.frames_delivered,
                "chunk delivered"
            );
            chunk_start = chunk_end;
        }
        Ok(())
    }

    fn chunk_specs(&self, chunk: FrameRange) -> ReelResult<Vec<FrameSpec>> {
        (chunk.start.0..chunk.end.0)
            .map(|f| {
                self.timeline.frame_at(FrameIndex(f)).ok_or_else(|| {
                    ReelError::validation(format!("frame {f} is outside the timeline"))
                })
            })
            .collect()
    }
}

fn render_chunk_parallel(
    composer: &FrameComposer,
    specs: &[FrameSpec],
    pool: &rayon::ThreadPool,
) -> Vec<ReelResult<RenderedFrame>> {
    pool.install(|| {
        specs
            .par_iter()
            .map_init(
                || composer.worker(),
                |worker, spec| match worker {
                    Ok(worker) => worker.render(spec),
                    Err(err) => Err(ReelError::resource(format!(
                        "could not open worker fonts: {err}"
                    ))),
                },
            )
            .collect()
    })
}

/// Failures inside a pass are encode failures unless they already say otherwise.
fn as_pass_failure(err: ReelError, index: FrameIndex) -> ReelError {
    match err {
        ReelError::Encode(_) | ReelError::Cancelled(_) => err,
        other => ReelError::encode(format!("frame {}: {other}", index.0)),
    }
}

fn build_thread_pool(threads: Option<usize>) -> ReelResult<rayon::ThreadPool> {
    if threads == Some(0) {
        return Err(ReelError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ReelError::validation(format!("failed to build rayon thread pool: {e}")))
}

fn normalized_chunk_size(chunk_size: usize) -> u64 {
    if chunk_size == 0 { 1 } else { chunk_size as u64 }
}

/// Sequence `script` under `article`'s title, render it with `config` and deliver every frame
/// to `encoder`. Returns the path reported by the encoder.
///
/// Blank scripts fail with [`ReelError::EmptyScript`] and an unusable font chain with
/// [`ReelError::ResourceUnavailable`], both before any frame reaches the encoder.
#[tracing::instrument(skip_all, fields(title = %article.title))]
pub fn create_video(
    article: &Article,
    script: &Script,
    config: &VideoConfig,
    encoder: &mut dyn Encoder,
) -> ReelResult<PathBuf> {
    create_video_with_cancel(article, script, config, encoder, CancelFlag::new())
        .map(|(path, _)| path)
}

pub fn create_video_with_cancel(
    article: &Article,
    script: &Script,
    config: &VideoConfig,
    encoder: &mut dyn Encoder,
    cancel: CancelFlag,
) -> ReelResult<(PathBuf, RenderStats)> {
    let mut pipeline = prepare(article, script, config)?.with_cancel_flag(cancel);
    pipeline.run(encoder)
}

/// Validate `config`, build the timeline and resolve fonts, without rendering anything.
pub fn prepare(article: &Article, script: &Script, config: &VideoConfig) -> ReelResult<Pipeline> {
    config.validate()?;
    let timeline = TimelineBuilder::new(config.canvas, config.text_display_secs)
        .with_title_secs(config.title_secs)
        .with_body_background(BackgroundSource::from_image_reference(
            article.image.as_deref(),
        ))
        .build(&article.title, script)?;
    let face = FontSource::new(config.fonts.clone()).resolve()?;
    tracing::info!(
        face = face.name(),
        segments = timeline.segments().len(),
        frames = timeline.total_frames(),
        "video prepared"
    );
    Ok(Pipeline::new(timeline, config, face))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::Rgb8, text::FontCandidate};

    #[derive(Default)]
    struct Collect {
        frames: Vec<RenderedFrame>,
        aborted: bool,
    }

    impl Encoder for Collect {
        fn encode_frame(&mut self, frame: &RenderedFrame) -> ReelResult<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> ReelResult<PathBuf> {
            Ok(PathBuf::from("memory"))
        }

        fn abort(&mut self) {
            self.aborted = true;
        }
    }

    fn small_config() -> VideoConfig {
        VideoConfig {
            canvas: CanvasConfig::new(64, 36, 4).unwrap(),
            text_display_secs: 1.0,
            title_secs: 1.0,
            title_font_px: 10,
            body_font_px: 8,
            side_margin_px: 8,
            fonts: vec![FontCandidate::Builtin],
            ..VideoConfig::default()
        }
    }

    #[test]
    fn sequential_run_delivers_every_frame_in_order() {
        let script = Script::new("hook", ["one", "two"], "end").unwrap();
        let mut pipeline = prepare(&Article::new("T"), &script, &small_config()).unwrap();
        let mut enc = Collect::default();
        let (path, stats) = pipeline.run(&mut enc).unwrap();

        assert_eq!(path, PathBuf::from("memory"));
        assert_eq!(stats.frames_total, 20);
        assert_eq!(stats.frames_delivered, 20);
        assert_eq!(stats.backgrounds_resolved, 1);
        assert_eq!(pipeline.state(), &RunState::Done);
        for (i, f) in enc.frames.iter().enumerate() {
            assert_eq!(f.index, FrameIndex(i as u64));
            assert_eq!((f.pixels.width, f.pixels.height), (64, 36));
        }
    }

    #[test]
    fn first_frame_of_each_segment_is_plain_background() {
        let script = Script::new("", ["body"], "").unwrap();
        let pipeline = prepare(&Article::new("T"), &script, &small_config()).unwrap();
        let bg = BackgroundProvider::default().resolve(&BackgroundSource::None, 64, 36);
        assert_eq!(pipeline.render_frame(FrameIndex(0)).unwrap().pixels, bg);
        assert_eq!(pipeline.render_frame(FrameIndex(4)).unwrap().pixels, bg);
        assert_ne!(pipeline.render_frame(FrameIndex(6)).unwrap().pixels, bg);
        assert!(pipeline.render_frame(FrameIndex(8)).is_err());
    }

    #[test]
    fn a_pipeline_runs_once() {
        let script = Script::new("x", Vec::<String>::new(), "").unwrap();
        let mut pipeline = prepare(&Article::new("T"), &script, &small_config()).unwrap();
        assert!(!pipeline.state().is_terminal());
        pipeline.run(&mut Collect::default()).unwrap();
        assert!(pipeline.state().is_terminal());

        let mut second = Collect::default();
        assert!(matches!(
            pipeline.run(&mut second),
            Err(ReelError::Validation(_))
        ));
        assert!(second.frames.is_empty());
        assert_eq!(pipeline.state(), &RunState::Done);
    }

    #[test]
    fn cancellation_before_start_aborts_without_frames() {
        let script = Script::new("x", Vec::<String>::new(), "").unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut enc = Collect::default();
        let err = create_video_with_cancel(
            &Article::new("T"),
            &script,
            &small_config(),
            &mut enc,
            cancel,
        )
        .unwrap_err();
        assert!(matches!(err, ReelError::Cancelled(0)));
        assert!(enc.frames.is_empty());
        assert!(enc.aborted);
    }

    #[test]
    fn pass_failures_are_reported_as_encode_errors() {
        let err = as_pass_failure(ReelError::validation("bad"), FrameIndex(7));
        assert!(matches!(err, ReelError::Encode(ref m) if m.contains("frame 7")));
        assert!(matches!(
            as_pass_failure(ReelError::Cancelled(3), FrameIndex(3)),
            ReelError::Cancelled(3)
        ));
    }

    #[test]
    fn text_color_comes_from_config() {
        let mut cfg = small_config();
        cfg.text_color = Rgb8::new(255, 0, 0);
        let script = Script::new("", ["wide words"], "").unwrap();
        let pipeline = prepare(&Article::new(""), &script, &cfg).unwrap();
        let frame = pipeline.render_frame(FrameIndex(2)).unwrap();
        let has_red = frame
            .pixels
            .data
            .chunks_exact(3)
            .any(|p| p == [255, 0, 0]);
        assert!(has_red);
    }
}
