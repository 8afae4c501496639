//! Time source for session timestamps and retention decisions
//!
//! Everything that compares ages reads an injected [`Clock`]. Tokio timers only
//! decide when a retention pass runs, so tests drive expiry with [`ManualClock`]
//! instead of waiting on real time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Millisecond clock
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the UNIX epoch
    fn now_ms(&self) -> u64;
}

/// Wall clock that never goes backwards.
///
/// Readings are clamped to the highest value handed out so far, so creation
/// timestamps stay non-decreasing across NTP adjustments.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let prev = self.last.fetch_max(wall, Ordering::SeqCst);
        prev.max(wall)
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Whole milliseconds of a duration, saturating
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
