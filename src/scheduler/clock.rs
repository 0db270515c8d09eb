//! Scheduler clock
//!
//! Time that ignores whatever pause or time scale the host applies to its
//! own simulation, plus the two frame counters the scheduler runs on:
//! - render frames, advanced once per host frame
//! - physics frames, advanced once per fixed physics step
//!
//! The clock is a cheap handle (`Arc`) shared by the runtime, every manager
//! and every task context. Counters are atomics so tasks running on the
//! dispatcher's threads can read them.
//!
//! Wall time has millisecond resolution. Two reads within the same frame may
//! or may not return the same value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Where the clock reads wall time from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Milliseconds since the Unix epoch, read from the host
    System,
    /// Milliseconds set explicitly by the owner (tests, replays)
    Manual,
}

#[derive(Debug)]
struct ClockState {
    source: TimeSource,
    /// Current time for `TimeSource::Manual`, unused otherwise
    manual_ms: AtomicU64,
    frame: AtomicU64,
    physics_frames: AtomicU64,
}

/// Shared time source and frame counters
#[derive(Debug, Clone)]
pub struct Clock {
    state: Arc<ClockState>,
}

impl Clock {
    /// Clock backed by the host's wall time
    pub fn system() -> Self {
        Self::with_source(TimeSource::System, 0)
    }

    /// Clock whose time only moves when told to, starting at `start_ms`
    pub fn manual(start_ms: u64) -> Self {
        Self::with_source(TimeSource::Manual, start_ms)
    }

    fn with_source(source: TimeSource, start_ms: u64) -> Self {
        Self {
            state: Arc::new(ClockState {
                source,
                manual_ms: AtomicU64::new(start_ms),
                frame: AtomicU64::new(0),
                physics_frames: AtomicU64::new(0),
            }),
        }
    }

    pub fn source(&self) -> TimeSource {
        self.state.source
    }

    /// Seconds since the Unix epoch (or since zero for a manual clock)
    pub fn time(&self) -> f64 {
        self.time_millis() as f64 / 1000.0
    }

    /// Milliseconds since the Unix epoch. Prefer this over [`Clock::time`]
    /// for differences, it avoids float precision loss.
    pub fn time_millis(&self) -> u64 {
        match self.state.source {
            TimeSource::System => system_millis(),
            TimeSource::Manual => self.state.manual_ms.load(Ordering::Acquire),
        }
    }

    /// Set the time of a manual clock. Ignored by a system clock.
    pub fn set_millis(&self, ms: u64) {
        self.state.manual_ms.store(ms, Ordering::Release);
    }

    /// Move a manual clock forward. Ignored by a system clock.
    pub fn advance(&self, by: Duration) {
        self.state
            .manual_ms
            .fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }

    /// Current render frame
    pub fn frame(&self) -> u64 {
        self.state.frame.load(Ordering::Acquire)
    }

    /// Start the next render frame, returning its number
    pub fn advance_frame(&self) -> u64 {
        self.state.frame.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Physics steps taken since the clock was created. Only meaningful for
    /// relative comparisons.
    pub fn physics_frames(&self) -> u64 {
        self.state.physics_frames.load(Ordering::Acquire)
    }

    /// Record one physics step, returning the new count
    pub fn advance_physics_frame(&self) -> u64 {
        self.state.physics_frames.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether two handles refer to the same clock
    pub fn same_clock(&self, other: &Clock) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn system_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(target_arch = "wasm32")]
fn system_millis() -> u64 {
    js_sys::Date::now() as u64
}
