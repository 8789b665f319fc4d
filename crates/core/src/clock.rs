// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for time-dependent logic.
//!
//! Rate windows, restart backoff, and envelope timestamps all read time
//! through this trait so tests can drive time deterministically.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant, for deadlines and windows.
    fn now(&self) -> Instant;

    /// Wall-clock seconds since the Unix epoch, for envelope timestamps.
    fn epoch_secs(&self) -> f64;
}

/// Real clock for production use.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Manually-advanced clock for testing.
///
/// Clones share the same offset, so a test can hold one handle while the
/// code under test holds another.
#[derive(Clone)]
pub struct FakeClock {
    start: Instant,
    epoch_base: f64,
    offset: Arc<Mutex<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            epoch_base: 1_700_000_000.0,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock();
        *offset += duration;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }

    fn epoch_secs(&self) -> f64 {
        self.epoch_base + self.offset.lock().as_secs_f64()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
