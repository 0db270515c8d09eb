//! Host drivers
//!
//! A host has to call two hooks: one per rendered frame and one per fixed
//! physics step. These drivers do that for common hosts:
//!
//! - Native: [`native::FrameLoop`] paces frames with `std::thread::sleep`
//! - Browser (wasm32-unknown-unknown): `web::start` rides
//!   requestAnimationFrame
//!
//! Both turn variable frame times into whole physics steps with
//! [`FixedStep`].

use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;

#[cfg(target_arch = "wasm32")]
#[cfg(target_os = "unknown")] // Browser WASM (no WASI)
pub mod web;

/// Most physics steps run for a single frame. Time beyond that is dropped
/// so a long stall does not snowball.
pub const MAX_STEPS_PER_FRAME: u32 = 8;

/// Fixed-timestep accumulator
#[derive(Debug, Clone)]
pub struct FixedStep {
    interval: Duration,
    accumulator: Duration,
    max_steps: u32,
}

impl FixedStep {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_nanos(1)),
            accumulator: Duration::ZERO,
            max_steps: MAX_STEPS_PER_FRAME,
        }
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time carried over to the next frame
    pub fn pending(&self) -> Duration {
        self.accumulator
    }

    /// Add a frame's elapsed time and return how many steps are due
    pub fn accumulate(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let mut steps = 0;
        while self.accumulator >= self.interval && steps < self.max_steps {
            self.accumulator -= self.interval;
            steps += 1;
        }
        if steps == self.max_steps && self.accumulator >= self.interval {
            self.accumulator = Duration::ZERO;
        }
        steps
    }
}
