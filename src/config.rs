use crate::encoder::{default_candidates, CodecCandidate};
use crate::output::default_preferred_root;
use crate::overlay::OverlayStyle;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Target frames per second.
    pub fps: u32,
    /// Codec candidates in priority order.
    pub codecs: Vec<CodecCandidate>,
    /// Volume/folder recordings go to when present.
    pub preferred_root: PathBuf,
    pub display_index: usize,
    pub overlay: OverlayStyle,
    pub font_path: Option<PathBuf>,
    /// MJPEG quality for the in-process AVI writer.
    pub jpeg_quality: u8,
    /// Pause after a failed capture or write before the next attempt.
    pub retry_pause: Duration,
    /// Emit a progress event every this many frames (0 disables).
    pub progress_every: u64,
    pub max_duration: Option<Duration>,
}

impl RecorderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            codecs: default_candidates(),
            preferred_root: default_preferred_root(),
            display_index: 0,
            overlay: OverlayStyle::default(),
            font_path: None,
            jpeg_quality: 70,
            retry_pause: Duration::from_millis(100),
            progress_every: 50,
            max_duration: None,
        }
    }
}
