//! Error types for the recorder core.

use crate::session::SessionState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("no displays found")]
    NoDisplay,

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("could not create output folder {path}: {reason}")]
    Folder { path: PathBuf, reason: String },

    #[error("codec {codec} unavailable: {reason}")]
    CodecUnavailable { codec: String, reason: String },

    #[error("no codec produced a writable encoder (tried: {})", tried.join(", "))]
    NoUsableCodec { tried: Vec<String> },

    #[error("frame is {actual:?} but encoder was opened for {expected:?}")]
    FrameSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("encoder is no longer open")]
    EncoderClosed,

    #[error("frame encode failed: {0}")]
    Encode(String),

    #[error("output file reached its size limit of {limit} bytes")]
    FileLimit { limit: u64 },

    #[error("invalid codec candidate {0:?}: expected a 4 character tag")]
    InvalidCodec(String),

    #[error("cannot {op} while session is {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecordError>;
