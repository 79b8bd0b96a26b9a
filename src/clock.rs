//! Time source for the coordinator.
//!
//! The poll loop only ever reads the time and sleeps through this trait, so
//! tests can run a 300 s timeout without waiting for it.

use chrono::{DateTime, Utc};
use std::time::Duration;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, d: Duration);
}

/// Wall clock + `thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}
