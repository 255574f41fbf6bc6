#![allow(dead_code)]

use chrono::{DateTime, Local, TimeZone};
use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use watermark_recorder::{
    CodecCandidate, Clock, EncoderBackend, EventSink, Frame, FrameSource, RecordError, Result,
    SessionEvent, StopFlag, VideoWriter,
};

#[derive(Clone)]
pub struct TestClock {
    start: Instant,
    now: Arc<Mutex<Instant>>,
    pub sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl TestClock {
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            start,
            now: Arc::new(Mutex::new(start)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn wall(&self) -> DateTime<Local> {
        let base = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let offset = self.now().duration_since(self.start);
        base + chrono::Duration::from_std(offset).unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

#[derive(Clone, Default)]
pub struct CollectingSink(pub Arc<Mutex<Vec<SessionEvent>>>);

impl CollectingSink {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &SessionEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// Shared record of what the fake encoders were asked to do.
#[derive(Default)]
pub struct Probe {
    pub log: Vec<String>,
    pub frames: u64,
    pub releases: u32,
}

pub type SharedProbe = Arc<Mutex<Probe>>;

pub struct FakeWriter {
    name: String,
    writable: bool,
    attempts: u64,
    fail_attempts: Vec<u64>,
    close_at_attempt: Option<u64>,
    released: bool,
    probe: SharedProbe,
}

impl VideoWriter for FakeWriter {
    fn is_opened(&self) -> bool {
        self.writable && !self.released
    }

    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.attempts += 1;
        if self.close_at_attempt == Some(self.attempts) {
            self.writable = false;
            return Err(RecordError::EncoderClosed);
        }
        if !self.is_opened() {
            return Err(RecordError::EncoderClosed);
        }
        if self.fail_attempts.contains(&self.attempts) {
            return Err(RecordError::Encode("disk hiccup".to_string()));
        }
        self.probe.lock().unwrap().frames += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            let mut probe = self.probe.lock().unwrap();
            probe.releases += 1;
            probe.log.push(format!("release:{}", self.name));
        }
        Ok(())
    }
}

/// Opens every candidate; only the listed ones report writable, and the
/// `refuse` ones fail to open at all.
#[derive(Default)]
pub struct FakeBackend {
    pub writable: Vec<&'static str>,
    pub refuse: Vec<&'static str>,
    pub fail_attempts: Vec<u64>,
    pub close_at_attempt: Option<u64>,
    pub probe: SharedProbe,
}

impl FakeBackend {
    pub fn writable(names: &[&'static str]) -> Self {
        Self {
            writable: names.to_vec(),
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.probe.lock().unwrap().log.clone()
    }

    pub fn releases(&self) -> u32 {
        self.probe.lock().unwrap().releases
    }

    pub fn frames(&self) -> u64 {
        self.probe.lock().unwrap().frames
    }
}

impl EncoderBackend for FakeBackend {
    fn open(
        &self,
        _path: &Path,
        candidate: &CodecCandidate,
        _size: (u32, u32),
        _fps: u32,
    ) -> Result<Box<dyn VideoWriter>> {
        self.probe
            .lock()
            .unwrap()
            .log
            .push(format!("open:{}", candidate.name));
        if self.refuse.contains(&candidate.name.as_str()) {
            return Err(RecordError::CodecUnavailable {
                codec: candidate.name.clone(),
                reason: "not installed".to_string(),
            });
        }
        Ok(Box::new(FakeWriter {
            name: candidate.name.clone(),
            writable: self.writable.contains(&candidate.name.as_str()),
            attempts: 0,
            fail_attempts: self.fail_attempts.clone(),
            close_at_attempt: self.close_at_attempt,
            released: false,
            probe: self.probe.clone(),
        }))
    }
}

pub struct FakeSource {
    pub size: (u32, u32),
    pub clock: Option<TestClock>,
    pub capture_cost: Duration,
    pub fail_captures: Vec<u64>,
    /// Raise this flag while capture number `.1` is in flight.
    pub raise_during: Option<(StopFlag, u64)>,
    pub captures: u64,
}

impl FakeSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            clock: None,
            capture_cost: Duration::ZERO,
            fail_captures: Vec::new(),
            raise_during: None,
            captures: 0,
        }
    }

    pub fn timed(mut self, clock: &TestClock, cost: Duration) -> Self {
        self.clock = Some(clock.clone());
        self.capture_cost = cost;
        self
    }
}

impl FrameSource for FakeSource {
    fn resolution(&self) -> (u32, u32) {
        self.size
    }

    fn capture(&mut self) -> Result<Frame> {
        self.captures += 1;
        if let Some(clock) = &self.clock {
            clock.advance(self.capture_cost);
        }
        if let Some((flag, at)) = &self.raise_during {
            if *at == self.captures {
                flag.request();
            }
        }
        if self.fail_captures.contains(&self.captures) {
            return Err(RecordError::Capture("display asleep".to_string()));
        }
        Ok(RgbImage::from_pixel(self.size.0, self.size.1, Rgb([90, 120, 150])))
    }
}

pub fn candidates(names: &[&str]) -> Vec<CodecCandidate> {
    names.iter().map(|n| n.parse().unwrap()).collect()
}
