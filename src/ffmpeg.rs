//! Out-of-process encoding through an `ffmpeg` child reading raw RGB frames
//! on stdin.

use crate::encoder::{CodecCandidate, EncoderBackend, VideoWriter};
use crate::error::{RecordError, Result};
use crate::frame_source::Frame;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

/// 4:2:0 output needs even dimensions; odd displays get one padding column/row.
const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// How long a freshly spawned ffmpeg gets to reject its arguments before the
/// handle is considered writable.
const STARTUP_GRACE: Duration = Duration::from_millis(150);

/// ffmpeg encoder name for a fourcc, if ffmpeg can produce it.
pub fn ffmpeg_encoder_for(fourcc: &[u8; 4]) -> Option<&'static str> {
    match &fourcc.map(|b| b.to_ascii_uppercase()) {
        b"XVID" => Some("libxvid"),
        b"MP4V" | b"FMP4" | b"DIVX" => Some("mpeg4"),
        b"X264" | b"H264" | b"AVC1" => Some("libx264"),
        b"MJPG" => Some("mjpeg"),
        _ => None,
    }
}

/// True when `ffmpeg -encoders` output lists `name` as a video encoder.
pub fn encoder_listed(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| {
        let mut cols = line.split_whitespace();
        match (cols.next(), cols.next()) {
            (Some(flags), Some(enc)) => flags.starts_with('V') && enc == name,
            _ => false,
        }
    })
}

pub fn build_ffmpeg_args(
    encoder: &str,
    fourcc: &str,
    width: u32,
    height: u32,
    fps: u32,
    output_path: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        "rgb24".to_string(),
        "-video_size".to_string(),
        format!("{}x{}", width, height),
        "-framerate".to_string(),
        fps.max(1).to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        encoder.to_string(),
    ];

    if encoder == "libx264" {
        args.extend(["-preset".to_string(), "veryfast".to_string()]);
    }

    args.extend([
        "-vf".to_string(),
        EVEN_PAD_FILTER.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-vtag".to_string(),
        fourcc.to_string(),
        "-y".to_string(),
        output_path.display().to_string(),
    ]);
    args
}

pub struct FfmpegBackend {
    program: PathBuf,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegBackend {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn list_encoders(&self) -> std::io::Result<String> {
        let output = Command::new(&self.program)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl EncoderBackend for FfmpegBackend {
    fn open(
        &self,
        path: &Path,
        candidate: &CodecCandidate,
        size: (u32, u32),
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>> {
        let unavailable = |reason: String| RecordError::CodecUnavailable {
            codec: candidate.name.clone(),
            reason,
        };

        let encoder = ffmpeg_encoder_for(&candidate.fourcc)
            .ok_or_else(|| unavailable("no ffmpeg encoder for this tag".to_string()))?;
        let listing = self
            .list_encoders()
            .map_err(|e| unavailable(format!("ffmpeg not runnable: {e}")))?;
        if !encoder_listed(&listing, encoder) {
            return Err(unavailable(format!("ffmpeg lacks encoder {encoder}")));
        }

        let args = build_ffmpeg_args(encoder, &candidate.fourcc_str(), size.0, size.1, fps, path);
        let writer = FfmpegWriter::spawn(&self.program, &args, size)?;
        Ok(Box::new(writer))
    }
}

pub struct FfmpegWriter {
    process: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    size: (u32, u32),
}

impl FfmpegWriter {
    fn spawn(program: &Path, args: &[String], size: (u32, u32)) -> Result<Self> {
        let mut process = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;
        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| RecordError::Encode("failed to open ffmpeg stdin".to_string()))?;
        let frame_bytes = size.0 as usize * size.1 as usize * 3;
        let mut writer = Self {
            process,
            stdin: Some(BufWriter::with_capacity(frame_bytes.max(8192), stdin)),
            size,
        };

        std::thread::sleep(STARTUP_GRACE);
        if let Ok(Some(status)) = writer.process.try_wait() {
            log::debug!("ffmpeg exited during startup: {status}");
            writer.stdin = None;
        }
        Ok(writer)
    }
}

impl VideoWriter for FfmpegWriter {
    fn is_opened(&self) -> bool {
        self.stdin.is_some()
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let actual = frame.dimensions();
        if actual != self.size {
            return Err(RecordError::FrameSize {
                expected: self.size,
                actual,
            });
        }
        if let Ok(Some(status)) = self.process.try_wait() {
            self.stdin = None;
            return Err(RecordError::Encode(format!("ffmpeg exited: {status}")));
        }
        let stdin = self.stdin.as_mut().ok_or(RecordError::EncoderClosed)?;
        if let Err(err) = stdin.write_all(frame.as_raw()) {
            if err.kind() == std::io::ErrorKind::BrokenPipe {
                self.stdin = None;
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let Some(mut stdin) = self.stdin.take() else {
            // Closed earlier (startup exit or broken pipe); still reap the child.
            match self.process.wait() {
                Ok(status) => log::debug!("ffmpeg reaped: {status}"),
                Err(err) => log::warn!("ffmpeg wait failed: {err}"),
            }
            return Ok(());
        };
        let flushed = stdin.flush();
        drop(stdin);
        let status = self.process.wait()?;
        flushed?;
        if !status.success() {
            return Err(RecordError::Encode(format!("ffmpeg exited: {status}")));
        }
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("ffmpeg shutdown: {err}");
        }
    }
}
