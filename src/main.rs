use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;
use watermark_recorder::{
    current_identity, default_preferred_root, install_signal_handlers, load_font, CodecCandidate,
    Compositor, OutputManager, OutputStatus, RecorderConfig, RecordingSession, ScreenFrameSource,
    StopFlag, SystemBackend,
};

/// Records the screen with a user/clock watermark until interrupted.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Frames per second for the video recording.
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Preferred output root; falls back to Documents/ScreenRecordings when absent.
    #[arg(short, long, value_name = "DIR")]
    output_root: Option<PathBuf>,

    /// Codec tags to try, in priority order.
    #[arg(long, value_delimiter = ',', default_value = "XVID,MJPG,mp4v,X264")]
    codec: Vec<CodecCandidate>,

    /// Index of the display to capture.
    #[arg(long, default_value_t = 0)]
    display: usize,

    /// Opacity of the watermark backing box (0..1).
    #[arg(long, default_value_t = 0.3)]
    bg_opacity: f32,

    /// Opacity of the watermark text (0..1).
    #[arg(long, default_value_t = 0.7)]
    text_opacity: f32,

    /// TrueType font for the watermark text.
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    /// JPEG quality used when recording MJPG.
    #[arg(long, default_value_t = 70)]
    jpeg_quality: u8,

    /// Stop automatically after this many seconds.
    #[arg(long)]
    max_seconds: Option<u64>,

    /// Seconds to wait before recording starts.
    #[arg(long, default_value_t = 3)]
    countdown: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = RecorderConfig {
        fps: cli.fps.max(1),
        codecs: cli.codec,
        preferred_root: cli.output_root.unwrap_or_else(default_preferred_root),
        display_index: cli.display,
        font_path: cli.font,
        jpeg_quality: cli.jpeg_quality.clamp(1, 100),
        max_duration: cli.max_seconds.map(Duration::from_secs),
        ..RecorderConfig::default()
    };
    config.overlay.bg_opacity = cli.bg_opacity.clamp(0.0, 1.0);
    config.overlay.text_opacity = cli.text_opacity.clamp(0.0, 1.0);

    let identity = current_identity();
    log::info!("detected user: {identity}");

    let stop = StopFlag::new();
    install_signal_handlers(stop.clone())?;

    let source = match ScreenFrameSource::open(config.display_index) {
        Ok(source) => source,
        Err(err) => {
            log::error!("cannot capture the screen: {err}");
            process::exit(1);
        }
    };

    let font = load_font(config.font_path.as_deref());
    let compositor = Compositor::new(config.overlay.clone(), font);
    let output = OutputManager::new(config.preferred_root.clone());
    let backend = SystemBackend::new(config.jpeg_quality);

    let mut session = RecordingSession::new(config, identity, Box::new(source))
        .with_compositor(compositor)
        .with_stop_flag(stop.clone());

    if let Err(err) = session.initialize(&output, &backend) {
        log::error!("recorder failed to initialize: {err}");
        process::exit(1);
    }

    for remaining in (1..=cli.countdown).rev() {
        if stop.is_requested() {
            break;
        }
        log::info!("recording starts in {remaining}...");
        thread::sleep(Duration::from_secs(1));
    }

    log::info!("press Ctrl+C to stop recording");
    let summary = session.run()?;

    match summary.status {
        OutputStatus::Ok(_) => Ok(()),
        OutputStatus::Missing | OutputStatus::Empty => process::exit(1),
    }
}
