mod avi_writer;
mod clock;
mod config;
mod encoder;
mod error;
mod events;
mod ffmpeg;
mod frame_source;
mod lifecycle;
mod output;
mod overlay;
mod session;

pub use avi_writer::{AviConfig, AviWriter, MAX_AVI_BYTES};
pub use clock::{cadence_sleep, Clock, SystemClock};
pub use config::RecorderConfig;
pub use encoder::{
    default_candidates, negotiate, CodecCandidate, EncoderBackend, NegotiatedEncoder,
    SystemBackend, VideoWriter,
};
pub use error::{RecordError, Result};
pub use events::{
    AttemptOutcome, EventSink, LogSink, SessionEvent, SessionSummary, StopReason, TickStage,
};
pub use ffmpeg::{build_ffmpeg_args, encoder_listed, ffmpeg_encoder_for, FfmpegBackend};
pub use frame_source::{rgba_to_frame, Frame, FrameSource, ScreenFrameSource};
pub use lifecycle::{install_signal_handlers, StopFlag};
pub use output::{
    current_identity, default_preferred_root, name_file, verify, OutputManager, OutputStatus,
    ResolvedFolder, CONTAINER_EXTENSION, FALLBACK_DIR_NAME,
};
pub use overlay::{
    blend_channel, build_overlay, load_font, Compositor, OverlayBox, OverlayItem, OverlayStyle,
};
pub use session::{RecordingSession, SessionState, TickOutcome};
