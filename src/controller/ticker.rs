//! Cancellable fixed-interval timer for the monitor loop.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime};

#[derive(Debug, PartialEq, Eq)]
pub enum Wait {
    Tick,
    Stopped,
}

/// Waits out one interval at a time. Sending on (or dropping) the paired
/// sender wakes a pending wait immediately with [`Wait::Stopped`].
///
/// Deadlines are spaced `interval` apart. When work overruns a deadline the
/// next tick fires at once and the schedule restarts from there; missed
/// ticks are not replayed.
pub struct Ticker {
    interval: Duration,
    next: Instant,
    stop_rx: Receiver<()>,
}

impl Ticker {
    /// The first deadline is one full interval from now.
    pub fn new(interval: Duration, stop_rx: Receiver<()>) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
            stop_rx,
        }
    }

    /// Restart the schedule so the next tick is one full interval from now.
    pub fn reset(&mut self) {
        self.next = Instant::now() + self.interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn wait(&mut self) -> Wait {
        let now = Instant::now();
        if self.next < now {
            self.next = now;
        }
        match self.stop_rx.recv_timeout(self.next - now) {
            Err(RecvTimeoutError::Timeout) => {
                self.next += self.interval;
                Wait::Tick
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Wait::Stopped,
        }
    }
}

/// Instant of the last successful tick, written by the monitor thread and
/// read by the presentation side.
#[derive(Debug)]
pub struct LastTick(AtomicI64);

const NO_TICK: i64 = i64::MIN;

impl LastTick {
    pub fn new() -> Self {
        Self(AtomicI64::new(NO_TICK))
    }

    pub(crate) fn record(&self, at: NaiveDateTime) {
        self.0.store(at.and_utc().timestamp(), Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.0.store(NO_TICK, Ordering::Release);
    }

    pub fn get(&self) -> Option<NaiveDateTime> {
        match self.0.load(Ordering::Acquire) {
            NO_TICK => None,
            secs => DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc()),
        }
    }
}

impl Default for LastTick {
    fn default() -> Self {
        Self::new()
    }
}
