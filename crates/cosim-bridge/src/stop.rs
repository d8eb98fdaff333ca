//! # Stop Signal
//!
//! Cloneable flag that ends a run. Raising it wakes any thread parked in
//! [`StopSignal::wait_timeout`], which is how a pending real-time sleep is
//! aborted promptly from a signal handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Inner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter.
    pub fn stop(&self) {
        let mut stopped = self.inner.stopped.lock();
        *stopped = true;
        self.inner.wake.notify_all();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Park for up to `timeout`. Returns `true` if the signal was raised.
    ///
    /// A timeout past the end of the clock waits for the signal alone.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.inner.wake.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                None => self.inner.wake.wait(&mut stopped),
            }
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out_without_stop() {
        let signal = StopSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_stop_wakes_waiter_promptly() {
        let signal = StopSignal::new();
        let remote = signal.clone();

        let waiter = thread::spawn(move || {
            let start = Instant::now();
            let stopped = remote.wait_timeout(Duration::from_secs(10));
            (stopped, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        signal.stop();

        let (stopped, waited) = waiter.join().unwrap();
        assert!(stopped);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_wait_still_wakes_on_stop() {
        let signal = StopSignal::new();
        let remote = signal.clone();

        let waiter = thread::spawn(move || remote.wait_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(20));
        signal.stop();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_after_stop_returns_immediately() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.is_stopped());
        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }
}
