//! Time sources for decision timestamps.
//!
//! Records carry unix-millisecond `initiated_at`/`completed_at` stamps. The
//! controller reads them through [`TimeSource`] so tests can pin time with a
//! [`VirtualClock`] and get byte-identical chains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source abstraction for getting the current time.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall clock time source for production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl WallClock {
    /// Creates a new wall clock time source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TimeSource for WallClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis().min(u128::from(u64::MAX)) as u64)
    }
}

/// Virtual time source for deterministic testing.
///
/// Time only advances when explicitly told to do so.
///
/// # Example
///
/// ```
/// use narrative_gate::time::{TimeSource, VirtualClock};
///
/// let clock = VirtualClock::starting_at(1_700_000_000_000);
/// clock.advance(250);
/// assert_eq!(clock.now_ms(), 1_700_000_000_250);
/// ```
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    /// Creates a new virtual clock starting at the epoch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Creates a virtual clock starting at `ms`.
    #[must_use]
    pub const fn starting_at(ms: u64) -> Self {
        Self {
            now: AtomicU64::new(ms),
        }
    }

    /// Advances time by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }

    /// Moves time to `ms`; earlier targets are ignored.
    pub fn advance_to(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::AcqRel);
    }
}

impl TimeSource for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}
