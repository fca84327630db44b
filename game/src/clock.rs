use std::cell::Cell;
use std::time::Duration;

use chrono::{DateTime, Local};

/// Wall-clock source. Read at evaluation instants only; nothing ticks in the background.
pub trait Clock: std::fmt::Debug {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        self.now.set(now);
    }

    pub fn advance(&self, dt: Duration) {
        let dt = chrono::Duration::from_std(dt).unwrap_or(chrono::Duration::zero());
        self.now.set(self.now.get() + dt);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now.get()
    }
}

/// Elapsed time between two instants, clamped at zero if the clock went backwards.
pub fn elapsed_between(start: DateTime<Local>, end: DateTime<Local>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}
