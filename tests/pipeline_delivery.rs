use std::path::PathBuf;

use newsreel::{
    Article, CancelFlag, CanvasConfig, Encoder, FontCandidate, FrameIndex, ReelError, ReelResult,
    RenderThreading, RenderedFrame, Rgb8, RunState, Script, VideoConfig, create_video,
    create_video_with_cancel, prepare,
};

#[derive(Default)]
struct MemoryEncoder {
    frames: Vec<RenderedFrame>,
    fail_at: Option<u64>,
    cancel_after: Option<(u64, CancelFlag)>,
    aborted: bool,
    finished: bool,
}

impl Encoder for MemoryEncoder {
    fn encode_frame(&mut self, frame: &RenderedFrame) -> ReelResult<()> {
        if self.fail_at == Some(frame.index.0) {
            return Err(ReelError::encode("disk full"));
        }
        self.frames.push(frame.clone());
        if let Some((n, flag)) = &self.cancel_after
            && frame.index.0 + 1 == *n
        {
            flag.cancel();
        }
        Ok(())
    }

    fn finish(&mut self) -> ReelResult<PathBuf> {
        self.finished = true;
        Ok(PathBuf::from("memory.mp4"))
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

fn test_config() -> VideoConfig {
    VideoConfig {
        canvas: CanvasConfig::new(96, 54, 6).unwrap(),
        text_display_secs: 1.0,
        title_secs: 1.0,
        title_font_px: 12,
        body_font_px: 9,
        side_margin_px: 10,
        fonts: vec![FontCandidate::Builtin],
        ..VideoConfig::default()
    }
}

fn script() -> Script {
    Script::new(
        "Hook line",
        ["First body segment is long enough to wrap", "Second"],
        "The end",
    )
    .unwrap()
}

#[test]
fn frames_arrive_in_ascending_order_then_finish() {
    let mut enc = MemoryEncoder::default();
    let path = create_video(&Article::new("Title"), &script(), &test_config(), &mut enc).unwrap();

    assert_eq!(path, PathBuf::from("memory.mp4"));
    assert!(enc.finished);
    assert!(!enc.aborted);
    assert_eq!(enc.frames.len(), 30);
    for (i, frame) in enc.frames.iter().enumerate() {
        assert_eq!(frame.index, FrameIndex(i as u64));
        assert_eq!(frame.pixels.data.len(), 96 * 54 * 3);
    }
}

#[test]
fn parallel_output_matches_sequential_output() {
    let mut seq = MemoryEncoder::default();
    create_video(&Article::new("Title"), &script(), &test_config(), &mut seq).unwrap();

    let mut cfg = test_config();
    cfg.threading = RenderThreading {
        parallel: true,
        chunk_size: 7,
        threads: Some(3),
    };
    let mut par = MemoryEncoder::default();
    create_video(&Article::new("Title"), &script(), &cfg, &mut par).unwrap();

    assert_eq!(seq.frames, par.frames);
}

#[test]
fn encoder_failure_aborts_the_run() {
    let mut pipeline = prepare(&Article::new("Title"), &script(), &test_config()).unwrap();
    let mut enc = MemoryEncoder {
        fail_at: Some(8),
        ..MemoryEncoder::default()
    };
    let err = pipeline.run(&mut enc).unwrap_err();

    assert!(matches!(err, ReelError::Encode(_)));
    assert_eq!(enc.frames.len(), 8);
    assert!(enc.aborted);
    assert!(!enc.finished);
    assert!(matches!(pipeline.state(), RunState::Aborted(msg) if msg.contains("disk full")));
}

#[test]
fn cancellation_stops_between_frames() {
    for parallel in [false, true] {
        let mut cfg = test_config();
        cfg.threading.parallel = parallel;
        cfg.threading.chunk_size = 4;

        let flag = CancelFlag::new();
        let mut enc = MemoryEncoder {
            cancel_after: Some((5, flag.clone())),
            ..MemoryEncoder::default()
        };
        let err =
            create_video_with_cancel(&Article::new("Title"), &script(), &cfg, &mut enc, flag)
                .unwrap_err();

        assert!(matches!(err, ReelError::Cancelled(5)), "parallel={parallel}");
        assert_eq!(enc.frames.len(), 5);
        assert!(enc.aborted);
    }
}

#[test]
fn exhausted_font_chain_fails_before_any_frame() {
    let mut cfg = test_config();
    cfg.fonts = vec![FontCandidate::Path(PathBuf::from("/no/such/font.ttf"))];
    let mut enc = MemoryEncoder::default();
    let err = create_video(&Article::new("Title"), &script(), &cfg, &mut enc).unwrap_err();

    assert!(matches!(err, ReelError::ResourceUnavailable(_)));
    assert!(enc.frames.is_empty());
    assert!(!enc.aborted);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut cfg = test_config();
    cfg.canvas.height = 55;
    let mut enc = MemoryEncoder::default();
    let err = create_video(&Article::new("Title"), &script(), &cfg, &mut enc).unwrap_err();
    assert!(matches!(err, ReelError::Validation(_)));
}

#[test]
fn body_frames_use_the_article_image() {
    let dir = std::env::temp_dir().join(format!("newsreel_img_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("lead.png");
    image::RgbImage::from_pixel(32, 18, image::Rgb([255, 0, 0]))
        .save(&path)
        .unwrap();

    let article = Article::new("Title").with_image(path.to_string_lossy());
    let pipeline = prepare(&article, &script(), &test_config()).unwrap();

    // First body frame is fully transparent text: background only.
    let body = pipeline.render_frame(FrameIndex(6)).unwrap().pixels;
    assert_eq!(body.pixel(48, 27), Rgb8::new(127, 0, 0));
    // Padding around the image: fill under the 50% black overlay.
    assert_eq!(body.pixel(0, 0), Rgb8::new(15, 15, 25));

    let title = pipeline.render_frame(FrameIndex(0)).unwrap().pixels;
    assert_eq!(title.pixel(0, 0), Rgb8::new(30, 30, 50));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn remote_image_falls_back_to_gradient() {
    let article = Article::new("Title").with_image("https://example.com/lead.jpg");
    let pipeline = prepare(&article, &script(), &test_config()).unwrap();
    let body = pipeline.render_frame(FrameIndex(6)).unwrap().pixels;
    let title = pipeline.render_frame(FrameIndex(0)).unwrap().pixels;
    assert_eq!(body, title);
}
