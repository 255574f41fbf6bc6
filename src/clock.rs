use chrono::{DateTime, Local};
use std::thread;
use std::time::{Duration, Instant};

/// Time source for the recording loop.
///
/// `now` drives cadence, `wall` feeds filenames and the overlay clock.
pub trait Clock {
    fn now(&self) -> Instant;
    fn wall(&self) -> DateTime<Local>;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Time left in a frame interval after `elapsed` was spent processing.
/// Never negative: an overrun tick yields zero, with no catch-up.
pub fn cadence_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_tick_clamps_to_zero() {
        let interval = Duration::from_secs_f64(1.0 / 10.0);
        assert_eq!(
            cadence_sleep(interval, Duration::from_millis(150)),
            Duration::ZERO
        );
    }

    #[test]
    fn fast_tick_sleeps_remainder() {
        let interval = Duration::from_millis(100);
        assert_eq!(
            cadence_sleep(interval, Duration::from_millis(30)),
            Duration::from_millis(70)
        );
    }
}
