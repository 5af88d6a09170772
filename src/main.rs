use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spectrum_reel::{
    audio::{AudioBackend, AudioGraph, AudioLoader, HeadlessBackend, RodioBackend, UserGesture},
    capture::{format::preference_order, negotiate, CaptureController, CaptureState, ClipHandle, EncoderBackend, FfmpegBackend},
    clock::SystemClock,
    config::{Config, CANVAS_HEIGHT, CANVAS_WIDTH},
    editor::{EditorCommand, EditorSession, SessionEvent},
    render::{BackgroundAsset, FrameRenderer, RenderConfig, VisualizerMode},
    trim::{format_timestamp, TrimWindow},
};

#[derive(Parser)]
#[command(
    name = "spectrum-reel",
    version,
    about = "Turn an audio track into a short vertical audio-reactive video clip",
    long_about = "Spectrum-Reel plays a track through a live spectrum visualizer and records up to 30 seconds of the rendered canvas plus audio into a downloadable clip."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one clip starting at an offset
    Record(RecordArgs),
    /// Render a single still frame to PNG
    Preview(PreviewArgs),
    /// Show which output formats this machine can encode
    Formats,
}

#[derive(Args)]
struct CanvasArgs {
    /// Audio file path (WAV, MP3, FLAC, OGG, M4A)
    track: PathBuf,

    /// Start offset in seconds
    #[arg(short, long, default_value_t = 0.0)]
    start: f64,

    /// Visualizer mode (bars, radial)
    #[arg(short, long, default_value = "bars")]
    mode: VisualizerMode,

    /// Title text; defaults to the track's file name
    #[arg(short, long)]
    title: Option<String>,

    /// Caption text
    #[arg(long, default_value = "")]
    caption: String,

    /// Background image
    #[arg(short, long)]
    background: Option<PathBuf>,
}

#[derive(Args)]
struct RecordArgs {
    #[command(flatten)]
    canvas: CanvasArgs,

    /// Play without a sound device
    #[arg(long)]
    headless: bool,
}

#[derive(Args)]
struct PreviewArgs {
    #[command(flatten)]
    canvas: CanvasArgs,

    /// Output PNG path
    #[arg(short, long, default_value = "preview.png")]
    output: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting Spectrum-Reel v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    match cli.command {
        Command::Record(args) => record(config, args).await,
        Command::Preview(args) => preview(config, args).await,
        Command::Formats => formats(config).await,
    }
}

async fn record(config: Config, args: RecordArgs) -> Result<()> {
    let canvas = args.canvas;
    let data = AudioLoader::load(&canvas.track).await?;
    let title = canvas.title.clone().unwrap_or_else(|| data.title());
    info!("Track: {} ({:.1}s)", title, data.duration);

    let clock = SystemClock::shared();
    let speaker: Box<dyn AudioBackend> = if args.headless {
        Box::new(HeadlessBackend)
    } else {
        Box::new(RodioBackend::new(config.audio.volume))
    };
    let mut graph = AudioGraph::new(config.audio.clone(), speaker, clock.clone());
    graph.load(data);

    let encoder = Arc::new(FfmpegBackend::detect(&config.capture).await);
    let capture = CaptureController::new(config.capture.clone(), encoder, clock);
    let renderer = FrameRenderer::new(&config.render)?;

    let mut render_config = RenderConfig::new(title, canvas.caption).with_mode(canvas.mode);
    if let Some(path) = canvas.background {
        render_config.background = BackgroundAsset::load_in_background(path, CANVAS_WIDTH, CANVAS_HEIGHT);
    }

    let mut session = EditorSession::new(graph, renderer, render_config, capture);
    let (observer, mut events) = mpsc::unbounded_channel();
    session.set_observer(observer);

    let (commands, receiver) = mpsc::unbounded_channel();
    commands.send(EditorCommand::SetStart(canvas.start))?;
    commands.send(EditorCommand::Record)?;

    let driver = async move {
        let mut clip: Option<ClipHandle> = None;
        let mut failure: Option<String> = None;
        let mut recording = false;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SessionEvent::TrimChanged { start, end }) => {
                        info!("Window {} - {}", format_timestamp(start), format_timestamp(end));
                    }
                    Some(SessionEvent::CaptureStateChanged(state)) => {
                        info!("Capture {}", state);
                        recording |= state == CaptureState::Recording;
                        if state == CaptureState::Failed {
                            let _ = commands.send(EditorCommand::Shutdown);
                        }
                    }
                    Some(SessionEvent::ClipReady(ready)) => {
                        clip = Some(ready);
                        let _ = commands.send(EditorCommand::Shutdown);
                    }
                    Some(SessionEvent::Error { message, recoverable }) => {
                        warn!(recoverable, "{}", message);
                        failure = Some(message);
                        // Nothing else will happen once the start was refused
                        if !recording {
                            let _ = commands.send(EditorCommand::Shutdown);
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, finishing the clip");
                    let _ = commands.send(EditorCommand::Stop);
                }
            }
        }
        (clip, failure)
    };

    let (outcome, (clip, failure)) = tokio::join!(session.run(receiver), driver);
    outcome?;

    match clip {
        Some(clip) => {
            println!("Clip: {}", clip.path.display());
            println!("Suggested filename: {}", clip.suggested_filename);
            println!("Format: {} ({:.1}s, {} bytes)", clip.mime(), clip.duration, clip.size_bytes);
            Ok(())
        }
        None => Err(anyhow::anyhow!(failure.unwrap_or_else(|| "Recording did not finish".to_string()))),
    }
}

async fn preview(config: Config, args: PreviewArgs) -> Result<()> {
    let canvas = args.canvas;
    let data = AudioLoader::load(&canvas.track).await?;
    let title = canvas.title.clone().unwrap_or_else(|| data.title());
    let duration = data.duration;

    let mut graph = AudioGraph::new(config.audio.clone(), Box::new(HeadlessBackend), SystemClock::shared());
    graph.load(data);
    graph.open(UserGesture::observed())?;

    let start = TrimWindow::new().clamp(canvas.start, duration);
    graph.seek(start)?;
    // Settle the smoothed spectrum at the chosen position
    let mut analysis = graph.current_analysis_frame();
    for _ in 0..16 {
        analysis = graph.current_analysis_frame();
    }

    let mut render_config = RenderConfig::new(title, canvas.caption).with_mode(canvas.mode);
    if let Some(path) = canvas.background {
        render_config.background = BackgroundAsset::load_blocking(&path, CANVAS_WIDTH, CANVAS_HEIGHT);
    }

    let renderer = FrameRenderer::new(&config.render)?;
    let frame = renderer.render(&render_config, &analysis, graph.playback_fraction());
    frame.save_png(&args.output)?;

    info!("Preview at {} saved to {:?}", format_timestamp(start), args.output);
    graph.close();
    Ok(())
}

async fn formats(config: Config) -> Result<()> {
    let backend = FfmpegBackend::detect(&config.capture).await;
    let candidates = preference_order(&config.capture.preferred_formats);

    for format in &candidates {
        let mark = if backend.is_type_supported(format) { "yes" } else { "no" };
        println!("{:<4} {}", mark, format);
    }

    match negotiate(&candidates, &backend) {
        Ok(format) => println!("Selected: {} ({})", format.label, format.mime),
        Err(e) => println!("{}", e),
    }
    Ok(())
}
