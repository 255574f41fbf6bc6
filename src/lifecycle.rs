//! Cooperative shutdown. Signal handlers only flip an atomic flag; the
//! recording loop reads it at tick boundaries and does the actual teardown.

use crate::error::{RecordError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the first request.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Routes SIGINT/SIGTERM/SIGHUP (Ctrl+C / console close on Windows) to `flag`.
pub fn install_signal_handlers(flag: StopFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        flag.request();
    })
    .map_err(|e| RecordError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_request_counts() {
        let flag = StopFlag::new();
        let remote = flag.clone();
        assert!(!flag.is_requested());
        assert!(remote.request());
        assert!(!remote.request());
        assert!(flag.is_requested());
    }
}
