#[cfg(any(test, feature = "test-util"))]
use std::cell::Cell;
#[cfg(any(test, feature = "test-util"))]
use std::rc::Rc;
#[cfg(any(test, feature = "test-util"))]
use std::time::Duration;

use time::OffsetDateTime;

pub trait Clock {
    fn now(&self) -> OffsetDateTime;

    fn now_millis(&self) -> i64 {
        unix_millis(self.now())
    }
}

pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone)]
pub struct ManualClock {
    now: Rc<Cell<OffsetDateTime>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        ManualClock {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        self.now.get()
    }
}
