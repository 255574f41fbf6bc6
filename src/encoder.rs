//! Codec negotiation: walk an ordered candidate list until one backend hands
//! back a writable encoder.

use crate::avi_writer::{AviConfig, AviWriter};
use crate::error::{RecordError, Result};
use crate::events::{AttemptOutcome, EventSink, SessionEvent};
use crate::ffmpeg::FfmpegBackend;
use crate::frame_source::Frame;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// One compression scheme the negotiator may try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecCandidate {
    pub name: String,
    pub fourcc: [u8; 4],
}

impl CodecCandidate {
    pub fn new(name: &str, fourcc: [u8; 4]) -> Self {
        Self {
            name: name.to_string(),
            fourcc,
        }
    }

    pub fn fourcc_str(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }
}

impl fmt::Display for CodecCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for CodecCandidate {
    type Err = RecordError;

    /// Parses a bare tag such as `XVID` or `mp4v`. The name is the upper-cased
    /// tag, the fourcc keeps the caller's case.
    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim();
        let bytes: [u8; 4] = tag
            .as_bytes()
            .try_into()
            .map_err(|_| RecordError::InvalidCodec(tag.to_string()))?;
        if !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
            return Err(RecordError::InvalidCodec(tag.to_string()));
        }
        Ok(Self::new(&tag.to_ascii_uppercase(), bytes))
    }
}

/// XVID, MJPG, MP4V, X264, in that order.
pub fn default_candidates() -> Vec<CodecCandidate> {
    vec![
        CodecCandidate::new("XVID", *b"XVID"),
        CodecCandidate::new("MJPG", *b"MJPG"),
        CodecCandidate::new("MP4V", *b"mp4v"),
        CodecCandidate::new("X264", *b"X264"),
    ]
}

/// An open encoder bound to one output file.
pub trait VideoWriter {
    /// Whether frames can still be written.
    fn is_opened(&self) -> bool;
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    /// Flush and close. Calling it again is a no-op.
    fn release(&mut self) -> Result<()>;
}

pub trait EncoderBackend {
    fn open(
        &self,
        path: &Path,
        candidate: &CodecCandidate,
        size: (u32, u32),
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>>;
}

/// The handle that won negotiation.
pub struct NegotiatedEncoder {
    candidate: CodecCandidate,
    writer: Box<dyn VideoWriter>,
    released: bool,
}

impl NegotiatedEncoder {
    pub fn candidate(&self) -> &CodecCandidate {
        &self.candidate
    }

    pub fn is_opened(&self) -> bool {
        !self.released && self.writer.is_opened()
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.released {
            return Err(RecordError::EncoderClosed);
        }
        self.writer.write_frame(frame)
    }

    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.writer.release()
    }
}

impl Drop for NegotiatedEncoder {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("encoder release on drop failed: {err}");
        }
    }
}

/// Opens the first candidate whose handle reports itself writable.
///
/// Handles that open but are not writable are released before the next
/// candidate is tried, so on failure nothing is left open.
pub fn negotiate(
    backend: &dyn EncoderBackend,
    path: &Path,
    candidates: &[CodecCandidate],
    size: (u32, u32),
    fps: u32,
    events: &dyn EventSink,
) -> Result<NegotiatedEncoder> {
    let mut tried = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        tried.push(candidate.name.clone());
        let outcome = match backend.open(path, candidate, size, fps) {
            Ok(writer) if writer.is_opened() => {
                events.emit(&SessionEvent::CodecAttempt {
                    codec: candidate.name.clone(),
                    outcome: AttemptOutcome::Writable,
                });
                events.emit(&SessionEvent::CodecSelected {
                    codec: candidate.name.clone(),
                    path: path.to_path_buf(),
                });
                return Ok(NegotiatedEncoder {
                    candidate: candidate.clone(),
                    writer,
                    released: false,
                });
            }
            Ok(mut writer) => {
                if let Err(err) = writer.release() {
                    log::debug!("releasing unwritable {} handle: {err}", candidate.name);
                }
                AttemptOutcome::NotWritable
            }
            Err(err) => AttemptOutcome::Failed(err.to_string()),
        };
        events.emit(&SessionEvent::CodecAttempt {
            codec: candidate.name.clone(),
            outcome,
        });
    }

    Err(RecordError::NoUsableCodec { tried })
}

/// Routes MJPG to the in-process AVI writer and everything else to ffmpeg.
pub struct SystemBackend {
    jpeg_quality: u8,
    ffmpeg: FfmpegBackend,
}

impl SystemBackend {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality,
            ffmpeg: FfmpegBackend::default(),
        }
    }
}

impl EncoderBackend for SystemBackend {
    fn open(
        &self,
        path: &Path,
        candidate: &CodecCandidate,
        size: (u32, u32),
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>> {
        if candidate.fourcc.eq_ignore_ascii_case(b"MJPG") {
            let writer = AviWriter::create(AviConfig {
                path: path.to_path_buf(),
                width: size.0,
                height: size.1,
                fps,
                jpeg_quality: self.jpeg_quality,
            })?;
            return Ok(Box::new(writer));
        }
        self.ffmpeg.open(path, candidate, size, fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_and_keeps_fourcc_case() {
        let c: CodecCandidate = "mp4v".parse().expect("candidate");
        assert_eq!(c.name, "MP4V");
        assert_eq!(&c.fourcc, b"mp4v");
    }

    #[test]
    fn rejects_wrong_length_tag() {
        assert!("H264X".parse::<CodecCandidate>().is_err());
        assert!("".parse::<CodecCandidate>().is_err());
    }

    #[test]
    fn default_order_matches_priority() {
        let names: Vec<_> = default_candidates().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["XVID", "MJPG", "MP4V", "X264"]);
    }
}
