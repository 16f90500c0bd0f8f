//! Wall-clock abstraction
//!
//! The battery's daily cycle budget and the price forecaster both depend on
//! "now". Reading it through [`Clock`] lets tests pin the time and roll the
//! calendar forward without sleeping.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Local calendar date of [`Clock::now`]
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Local system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Settable clock for tests and replays
///
/// Clones share the same instant, so a test can keep one handle and hand
/// another to the model under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<FixedOffset>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}
