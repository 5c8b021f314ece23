//! Poll windows and the clock they are cut from.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use crate::watermark::{format_watermark, truncate_to_second};

/// Half-open interval `[start, end)` collected by one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PollWindow {
    /// Window from `start` to `end`. An `end` earlier than `start` (the wall
    /// clock stepped backwards) is clamped so the watermark never regresses.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Window ending at the current second of `clock`.
    pub fn ending_now(start: DateTime<Utc>, clock: &dyn Clock) -> Self {
        Self::new(start, truncate_to_second(clock.now()))
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The watermark string handed to the sink and persisted afterwards.
    pub fn watermark(&self) -> String {
        format_watermark(self.end)
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid timestamp.
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
