//! Clock adapters.
//!
//! - [`SystemClock`] — wall clock from `std::time::SystemTime`.
//! - [`ManualClock`] — caller-driven time for replay and tests.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::ports::Clock;

/// Wall-clock time adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64())
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start_secs: f64) -> Self {
        Self {
            now: Cell::new(start_secs),
        }
    }

    pub fn advance(&self, secs: f64) {
        self.now.set(self.now.get() + secs);
    }

    pub fn set(&self, secs: f64) {
        self.now.set(secs);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        self.now.get()
    }
}
