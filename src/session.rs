//! The recording state machine.
//!
//! ```text
//! Uninitialized --initialize--> Ready --start--> Recording --stop--> Stopping --finish--> Stopped
//! ```
//!
//! Every stop trigger (stop flag, encoder loss, duration limit, explicit
//! request) goes through `Stopping`; teardown runs once in `finish`.

use crate::clock::{cadence_sleep, Clock, SystemClock};
use crate::config::RecorderConfig;
use crate::encoder::{negotiate, EncoderBackend, NegotiatedEncoder};
use crate::error::{RecordError, Result};
use crate::events::{EventSink, LogSink, SessionEvent, SessionSummary, StopReason, TickStage};
use crate::frame_source::FrameSource;
use crate::lifecycle::StopFlag;
use crate::output::{self, name_file, OutputManager};
use crate::overlay::Compositor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Recording,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame reached the encoder.
    Written,
    /// Capture or write failed; the next tick tries again.
    Retried,
    /// The session moved to `Stopping` instead of recording.
    Stopping,
    /// Not recording, nothing done.
    Idle,
}

pub struct RecordingSession {
    config: RecorderConfig,
    identity: String,
    source: Box<dyn FrameSource>,
    compositor: Compositor,
    clock: Box<dyn Clock>,
    events: Box<dyn EventSink>,
    stop: StopFlag,
    state: SessionState,
    frame_interval: Duration,
    output_path: Option<PathBuf>,
    codec: Option<String>,
    encoder: Option<NegotiatedEncoder>,
    frame_count: u64,
    started_at: Option<Instant>,
    stop_reason: Option<StopReason>,
    summary: Option<SessionSummary>,
}

impl RecordingSession {
    pub fn new(
        config: RecorderConfig,
        identity: impl Into<String>,
        source: Box<dyn FrameSource>,
    ) -> Self {
        let compositor = Compositor::new(config.overlay.clone(), None);
        let frame_interval = config.frame_interval();
        Self {
            config,
            identity: identity.into(),
            source,
            compositor,
            clock: Box::new(SystemClock),
            events: Box::new(LogSink),
            stop: StopFlag::new(),
            state: SessionState::Uninitialized,
            frame_interval,
            output_path: None,
            codec: None,
            encoder: None,
            frame_count: 0,
            started_at: None,
            stop_reason: None,
            summary: None,
        }
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Box<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Resolves the folder, samples the resolution and negotiates an encoder.
    /// On any failure the session stays `Uninitialized`.
    pub fn initialize(
        &mut self,
        output: &OutputManager,
        backend: &dyn EncoderBackend,
    ) -> Result<()> {
        self.expect_state("initialize", SessionState::Uninitialized)?;

        let folder = output.resolve_folder(&self.identity)?;
        self.events.emit(&SessionEvent::FolderResolved {
            path: folder.path.clone(),
            fallback: folder.fallback,
        });

        let (width, height) = self.source.resolution();
        if width == 0 || height == 0 {
            return Err(RecordError::Capture(format!("display reported {width}x{height}")));
        }
        self.events.emit(&SessionEvent::ResolutionSampled { width, height });

        let path = folder.path.join(name_file(&self.identity, &self.clock.wall()));
        let encoder = negotiate(
            backend,
            &path,
            &self.config.codecs,
            (width, height),
            self.config.fps,
            self.events.as_ref(),
        )?;

        self.codec = Some(encoder.candidate().name.clone());
        self.encoder = Some(encoder);
        self.output_path = Some(path);
        self.state = SessionState::Ready;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", SessionState::Ready)?;
        self.frame_count = 0;
        self.started_at = Some(self.clock.now());
        self.state = SessionState::Recording;
        self.events.emit(&SessionEvent::Started {
            path: self.output_path.clone().unwrap_or_default(),
            fps: self.config.fps,
        });
        Ok(())
    }

    /// One capture → composite → write cycle, followed by the cadence sleep.
    ///
    /// The stop flag is only read here, before any capture, so a stop raised
    /// mid-tick lands on the following call.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SessionState::Recording {
            return TickOutcome::Idle;
        }
        if self.stop.is_requested() {
            self.request_stop(StopReason::Signal);
            return TickOutcome::Stopping;
        }
        if let (Some(limit), Some(started)) = (self.config.max_duration, self.started_at) {
            if self.clock.now().duration_since(started) >= limit {
                self.request_stop(StopReason::DurationElapsed);
                return TickOutcome::Stopping;
            }
        }

        let tick_start = self.clock.now();
        let mut frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(err) => return self.retry_after(TickStage::Capture, err),
        };
        self.compositor.composite(&mut frame, &self.identity, &self.clock.wall());

        let Some(encoder) = self.encoder.as_mut() else {
            self.request_stop(StopReason::EncoderClosed);
            return TickOutcome::Stopping;
        };
        let written = encoder.write_frame(&frame);
        let still_open = encoder.is_opened();
        drop(frame);

        if let Err(err) = written {
            if !still_open {
                self.events.emit(&SessionEvent::TickFailed {
                    stage: TickStage::Write,
                    error: err.to_string(),
                });
                self.request_stop(StopReason::EncoderClosed);
                return TickOutcome::Stopping;
            }
            return self.retry_after(TickStage::Write, err);
        }

        self.frame_count += 1;
        if self.config.progress_every > 0 && self.frame_count % self.config.progress_every == 0 {
            self.events.emit(&SessionEvent::Progress {
                frames: self.frame_count,
            });
        }

        let elapsed = self.clock.now().duration_since(tick_start);
        self.clock.sleep(cadence_sleep(self.frame_interval, elapsed));
        TickOutcome::Written
    }

    fn retry_after(&mut self, stage: TickStage, err: RecordError) -> TickOutcome {
        self.events.emit(&SessionEvent::TickFailed {
            stage,
            error: err.to_string(),
        });
        self.clock.sleep(self.config.retry_pause);
        TickOutcome::Retried
    }

    /// Moves `Ready`/`Recording` to `Stopping`. Later requests are ignored.
    pub fn request_stop(&mut self, reason: StopReason) -> bool {
        match self.state {
            SessionState::Ready | SessionState::Recording => {
                self.state = SessionState::Stopping;
                self.stop_reason = Some(reason);
                self.events.emit(&SessionEvent::Stopping { reason });
                true
            }
            _ => false,
        }
    }

    /// Releases the encoder, verifies the file and reports the summary.
    ///
    /// Safe to call repeatedly: once `Stopped`, the cached summary is
    /// returned without touching the encoder or file again.
    pub fn finish(&mut self) -> Option<SessionSummary> {
        match self.state {
            SessionState::Uninitialized => return None,
            SessionState::Stopped => return self.summary.clone(),
            SessionState::Ready | SessionState::Recording => {
                self.request_stop(StopReason::Requested);
            }
            SessionState::Stopping => {}
        }

        if let Some(mut encoder) = self.encoder.take() {
            if let Err(err) = encoder.release() {
                log::warn!("encoder release failed: {err}");
            }
        }

        let path = self.output_path.clone().unwrap_or_default();
        let summary = SessionSummary {
            status: output::verify(&path),
            path,
            codec: self.codec.clone().unwrap_or_default(),
            frames: self.frame_count,
            elapsed: self
                .started_at
                .map(|started| self.clock.now().duration_since(started))
                .unwrap_or_default(),
            stop_reason: self.stop_reason.unwrap_or(StopReason::Requested),
        };
        self.state = SessionState::Stopped;
        self.events.emit(&SessionEvent::Finished(summary.clone()));
        self.summary = Some(summary.clone());
        Some(summary)
    }

    /// Starts (if needed), ticks until something stops the session, then
    /// tears down.
    pub fn run(&mut self) -> Result<SessionSummary> {
        if self.state == SessionState::Ready {
            self.start()?;
        }
        while self.state == SessionState::Recording {
            self.tick();
        }
        self.finish().ok_or(RecordError::InvalidState {
            op: "run",
            state: self.state,
        })
    }

    fn expect_state(&self, op: &'static str, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(RecordError::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }
}
