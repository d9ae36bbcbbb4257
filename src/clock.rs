//! Time sources for the capture loop
//!
//! The recorder never reads the wall clock directly. It asks a [`Clock`] for
//! timestamps and for pacing sleeps, which lets tests swap in [`FakeClock`]
//! and run a one-hour recording in microseconds.

use crate::recorder::stop::StopSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Residual waits shorter than this are skipped; the OS scheduler would oversleep them anyway.
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// How a call to [`Clock::sleep_until`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The deadline was reached (or was already in the past)
    Deadline,
    /// A stop was requested before the deadline
    Interrupted,
}

/// Monotonic nanosecond clock with an interruptible sleep
pub trait Clock: Send + Sync {
    /// Current timestamp in nanoseconds. Never decreases.
    fn now(&self) -> u64;

    /// Suspend the calling thread until `deadline` (nanoseconds, same base as [`Clock::now`]).
    ///
    /// Returns immediately when the deadline has passed. A stop request on `signal`
    /// ends the wait early with [`Wake::Interrupted`].
    fn sleep_until(&self, deadline: u64, signal: &StopSignal) -> Wake;
}

/// Clock backed by the host monotonic timer
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn sleep_until(&self, deadline: u64, signal: &StopSignal) -> Wake {
        let now = self.now();
        let remaining = Duration::from_nanos(deadline.saturating_sub(now));
        if remaining < MIN_SLEEP {
            return Wake::Deadline;
        }

        tracing::debug!("Sleep for: {} millis", remaining.as_millis());
        if signal.wait_until(Instant::now() + remaining) {
            Wake::Interrupted
        } else {
            Wake::Deadline
        }
    }
}

/// Deterministic clock for tests.
///
/// Every call to `now()` advances time by one nanosecond; `sleep_until` jumps
/// straight to the deadline without blocking.
#[derive(Debug, Default)]
pub struct FakeClock {
    current: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the counter without advancing it
    pub fn peek(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn sleep_until(&self, deadline: u64, _signal: &StopSignal) -> Wake {
        self.current.fetch_max(deadline, Ordering::SeqCst);
        Wake::Deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fake_clock_advances_on_every_read() {
        let clock = FakeClock::new();
        assert_eq!(clock.now(), 1);
        assert_eq!(clock.now(), 2);
        assert_eq!(clock.peek(), 2);
    }

    #[test]
    fn test_fake_clock_sleep_jumps_to_deadline() {
        let clock = FakeClock::new();
        let signal = StopSignal::new();

        assert_eq!(clock.sleep_until(1_000_000_000, &signal), Wake::Deadline);
        assert_eq!(clock.peek(), 1_000_000_000);

        // Sleeping into the past never rewinds the counter
        clock.sleep_until(10, &signal);
        assert_eq!(clock.now(), 1_000_000_001);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_system_clock_skips_past_deadlines() {
        let clock = SystemClock::new();
        let signal = StopSignal::new();
        let started = Instant::now();

        assert_eq!(clock.sleep_until(0, &signal), Wake::Deadline);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_system_clock_sleeps_until_deadline() {
        let clock = SystemClock::new();
        let signal = StopSignal::new();
        let deadline = clock.now() + Duration::from_millis(30).as_nanos() as u64;

        assert_eq!(clock.sleep_until(deadline, &signal), Wake::Deadline);
        assert!(clock.now() >= deadline);
    }

    #[test]
    fn test_system_clock_sleep_interrupted_by_stop() {
        let clock = Arc::new(SystemClock::new());
        let signal = StopSignal::new();
        let deadline = clock.now() + Duration::from_secs(60).as_nanos() as u64;

        let stopper = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stopper.request();
        });

        let started = Instant::now();
        assert_eq!(clock.sleep_until(deadline, &signal), Wake::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
    }
}
