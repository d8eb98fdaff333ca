//! Clock adapters.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ports::Clock;
use crate::stop::StopSignal;

/// Wall clock. Sleeps park on the stop signal so a stop request wakes
/// the sleeper immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, stop: &StopSignal) -> bool {
        !stop.wait_timeout(duration)
    }
}

/// Deterministic clock for tests: time moves only when advanced or slept.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Simulate work taking `by` of wall time. Saturates instead of
    /// overflowing `Instant`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add(by) {
            *now = next;
        }
    }

    /// Every sleep requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    #[must_use]
    pub fn total_slept(&self) -> Duration {
        self.sleeps
            .lock()
            .iter()
            .fold(Duration::ZERO, |total, d| total.saturating_add(*d))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration, stop: &StopSignal) -> bool {
        if stop.is_stopped() {
            return false;
        }
        self.sleeps.lock().push(duration);
        self.advance(duration);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new();
        let start = clock.now();
        let stop = StopSignal::new();

        assert!(clock.sleep(Duration::from_millis(3), &stop));
        clock.advance(Duration::from_millis(2));

        assert_eq!(clock.now() - start, Duration::from_millis(5));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(3)]);
    }

    #[test]
    fn test_sleep_aborts_when_stopped() {
        let stop = StopSignal::new();
        stop.stop();

        assert!(!ManualClock::new().sleep(Duration::from_secs(1), &stop));

        let started = Instant::now();
        assert!(!SystemClock.sleep(Duration::from_secs(5), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
