//! Native frame loop
//!
//! Paces render frames at the configured rate and runs the physics steps
//! owed since the previous frame before each one. With a manual clock the
//! loop also advances the clock's time, so whole runs are deterministic.

use super::FixedStep;
use crate::config::RuntimeConfig;
use crate::runtime::Runtime;
use crate::scheduler::TimeSource;
use std::time::{Duration, Instant};

/// Totals for one or more frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub physics_steps: u64,
    pub invoked: usize,
}

impl std::ops::AddAssign for FrameStats {
    fn add_assign(&mut self, other: Self) {
        self.frames += other.frames;
        self.physics_steps += other.physics_steps;
        self.invoked += other.invoked;
    }
}

pub struct FrameLoop {
    frame_interval: Duration,
    physics: FixedStep,
    /// Sleep between frames; off for simulated runs
    realtime: bool,
}

impl FrameLoop {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            physics: FixedStep::new(config.physics_interval()),
            realtime: true,
        }
    }

    /// Don't sleep; each frame is assumed to take exactly one interval
    pub fn simulated(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Run one frame that took `elapsed`: physics steps first, then the
    /// render tick
    pub fn advance(&mut self, runtime: &mut Runtime, elapsed: Duration) -> FrameStats {
        if runtime.clock().source() == TimeSource::Manual {
            runtime.clock().advance(elapsed);
        }

        let steps = self.physics.accumulate(elapsed);
        for _ in 0..steps {
            runtime.physics_step();
        }

        FrameStats {
            frames: 1,
            physics_steps: steps as u64,
            invoked: runtime.frame(),
        }
    }

    /// Run exactly `frames` frames
    pub fn run_for(&mut self, runtime: &mut Runtime, frames: u64) -> FrameStats {
        let mut remaining = frames;
        self.run_while(runtime, |_| {
            let go = remaining > 0;
            remaining = remaining.saturating_sub(1);
            go
        })
    }

    /// Run until `keep_going` returns false. It is checked before every
    /// frame.
    pub fn run_while<F>(&mut self, runtime: &mut Runtime, mut keep_going: F) -> FrameStats
    where
        F: FnMut(&Runtime) -> bool,
    {
        let mut totals = FrameStats::default();
        let mut last = Instant::now();

        while keep_going(runtime) {
            let elapsed = if self.realtime {
                let target = last + self.frame_interval;
                let now = Instant::now();
                if target > now {
                    std::thread::sleep(target - now);
                }
                let now = Instant::now();
                let elapsed = now - last;
                last = now;
                elapsed
            } else {
                self.frame_interval
            };

            totals += self.advance(runtime, elapsed);
        }

        totals
    }
}
