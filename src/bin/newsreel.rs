use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "newsreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render an MP4 video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Stage every frame as a numbered PNG.
    Frames(FramesArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Script JSON with `hook`, `segments` and `conclusion`.
    #[arg(long)]
    script: PathBuf,

    /// Article title shown on the opening segment.
    #[arg(long)]
    title: String,

    /// Lead image (local path) used behind body segments.
    #[arg(long)]
    image: Option<String>,

    /// Video configuration JSON; defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render frames on a rayon pool.
    #[arg(long)]
    parallel: bool,

    /// Worker thread count for `--parallel`.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output MP4 path. Defaults to a name derived from the title.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FramesArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Directory receiving `000000.png`, `000001.png`, ...
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Frame index (0-based).
    #[arg(long)]
    index: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frames(args) => cmd_frames(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

struct Inputs {
    article: newsreel::Article,
    script: newsreel::Script,
    config: newsreel::VideoConfig,
}

fn read_inputs(args: &InputArgs) -> anyhow::Result<Inputs> {
    let f = File::open(&args.script)
        .with_context(|| format!("open script '{}'", args.script.display()))?;
    let script: newsreel::Script = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse script '{}'", args.script.display()))?;

    let mut config = match &args.config {
        Some(path) => newsreel::VideoConfig::from_json_path(path)?,
        None => newsreel::VideoConfig::default(),
    };
    if args.parallel {
        config.threading.parallel = true;
    }
    if args.threads.is_some() {
        config.threading.threads = args.threads;
    }

    let mut article = newsreel::Article::new(args.title.clone());
    if let Some(image) = &args.image {
        article = article.with_image(image.clone());
    }

    Ok(Inputs {
        article,
        script,
        config,
    })
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let inputs = read_inputs(&args.input)?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(inputs.article.default_video_file_name()));

    let canvas = inputs.config.canvas;
    let mut encoder = newsreel::FfmpegEncoder::new(newsreel::default_mp4_config(
        &out,
        canvas.width,
        canvas.height,
        canvas.fps,
    ))?;
    let path = newsreel::create_video(
        &inputs.article,
        &inputs.script,
        &inputs.config,
        &mut encoder,
    )?;

    eprintln!("wrote {}", path.display());
    Ok(())
}

fn cmd_frames(args: FramesArgs) -> anyhow::Result<()> {
    let inputs = read_inputs(&args.input)?;
    let mut encoder = newsreel::PngSequenceEncoder::new(&args.out_dir)?;
    let path = newsreel::create_video(
        &inputs.article,
        &inputs.script,
        &inputs.config,
        &mut encoder,
    )?;

    eprintln!("wrote {} frames to {}", encoder.staged().len(), path.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let inputs = read_inputs(&args.input)?;
    let pipeline = newsreel::prepare(&inputs.article, &inputs.script, &inputs.config)?;
    let frame = pipeline.render_frame(newsreel::FrameIndex(args.index))?;

    write_png(&args.out, &frame.pixels)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn write_png(path: &Path, pixels: &newsreel::RgbFrame) -> anyhow::Result<()> {
    newsreel::encode_ffmpeg::ensure_parent_dir(path)?;
    image::save_buffer_with_format(
        path,
        &pixels.data,
        pixels.width,
        pixels.height,
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}
