//! Time sources.
//!
//! History timestamps, the coalescing window and the scheduler's
//! debounce/throttle deadlines are all read from a [`Clock`], so tests can
//! swap wall time for [`FixedClock`] or [`TokioClock`].
//!
//! ```
//! use folio::{Clock, FixedClock};
//!
//! let clock = FixedClock::new(1_000);
//! clock.advance(500);
//! assert_eq!(clock.now_millis(), 1_500);
//! ```

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that follows the tokio timer.
///
/// Reads `tokio::time::Instant`, so it agrees with `tokio::time::sleep`. Under
/// `tokio::time::pause()` it only moves when the runtime auto-advances, which
/// lets [`EditSession`](crate::scheduler::EditSession) tests run without real
/// waits.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    base_millis: u64,
}

impl TokioClock {
    /// Anchored at the current system time.
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now_millis())
    }

    /// Reads `base_millis` right now.
    pub fn starting_at(base_millis: u64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            base_millis,
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> u64 {
        self.base_millis + self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
pub struct FixedClock {
    millis: Mutex<u64>,
}

impl FixedClock {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Mutex::new(millis),
        }
    }

    pub fn advance(&self, ms: u64) {
        *self.lock() += ms;
    }

    pub fn set(&self, ms: u64) {
        *self.lock() = ms;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        // A poisoned u64 is still a valid u64
        self.millis.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        *self.lock()
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1_704_067_200_000)
    }
}

impl Debug for FixedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedClock")
            .field("millis", &self.now_millis())
            .finish()
    }
}
