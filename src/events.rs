//! Structured status reporting. The core emits [`SessionEvent`]s at fixed
//! lifecycle points and leaves rendering to an [`EventSink`].

use crate::output::OutputStatus;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Writable,
    NotWritable,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStage {
    Capture,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Signal or keyboard interrupt observed through the stop flag.
    Signal,
    /// Stopped programmatically via `request_stop` or `finish`.
    Requested,
    /// The encoder stopped accepting frames.
    EncoderClosed,
    /// Configured maximum duration reached.
    DurationElapsed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub codec: String,
    pub frames: u64,
    pub elapsed: Duration,
    pub status: OutputStatus,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    FolderResolved { path: PathBuf, fallback: bool },
    ResolutionSampled { width: u32, height: u32 },
    CodecAttempt { codec: String, outcome: AttemptOutcome },
    CodecSelected { codec: String, path: PathBuf },
    Started { path: PathBuf, fps: u32 },
    Progress { frames: u64 },
    TickFailed { stage: TickStage, error: String },
    Stopping { reason: StopReason },
    Finished(SessionSummary),
}

pub trait EventSink {
    fn emit(&self, event: &SessionEvent);
}

/// Renders events through the `log` facade.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &SessionEvent) {
        match event {
            SessionEvent::FolderResolved { path, fallback } => {
                if *fallback {
                    log::warn!(
                        "preferred output root unavailable, using {}",
                        path.display()
                    );
                } else {
                    log::info!("output folder: {}", path.display());
                }
            }
            SessionEvent::ResolutionSampled { width, height } => {
                log::info!("screen resolution: {width}x{height}");
            }
            SessionEvent::CodecAttempt { codec, outcome } => match outcome {
                AttemptOutcome::Writable => log::info!("codec {codec}: writable"),
                AttemptOutcome::NotWritable => {
                    log::warn!("codec {codec}: opened but not writable, released")
                }
                AttemptOutcome::Failed(reason) => log::warn!("codec {codec}: {reason}"),
            },
            SessionEvent::CodecSelected { codec, path } => {
                log::info!("recording with {codec} to {}", path.display());
            }
            SessionEvent::Started { path, fps } => {
                log::info!("recording started at {fps} fps -> {}", path.display());
            }
            SessionEvent::Progress { frames } => log::info!("recorded {frames} frames"),
            SessionEvent::TickFailed { stage, error } => {
                log::warn!("{stage:?} failed, retrying: {error}");
            }
            SessionEvent::Stopping { reason } => log::info!("stopping: {reason:?}"),
            SessionEvent::Finished(summary) => {
                log::info!(
                    "recorded {} frames in {:.1}s with {}",
                    summary.frames,
                    summary.elapsed.as_secs_f64(),
                    summary.codec
                );
                match summary.status {
                    OutputStatus::Ok(bytes) => log::info!(
                        "saved {} ({:.2} MB)",
                        summary.path.display(),
                        bytes as f64 / (1024.0 * 1024.0)
                    ),
                    OutputStatus::Empty => {
                        log::error!("output file is empty: {}", summary.path.display())
                    }
                    OutputStatus::Missing => {
                        log::error!("output file was not created: {}", summary.path.display())
                    }
                }
            }
        }
    }
}
