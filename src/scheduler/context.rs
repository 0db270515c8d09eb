//! Per-task timing bookkeeping
//!
//! A `TaskContext` records when a task was created and when it first ran,
//! in both wall time and render frames, and tracks the physics steps it has
//! observed. It is owned by exactly one [`Task`](super::Task).

use super::clock::Clock;
use serde::Serialize;
use std::time::Duration;

/// A point in time as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stamp {
    /// Wall time in milliseconds
    pub time_ms: u64,
    /// Render frame number
    pub frame: u64,
}

impl Stamp {
    fn now(clock: &Clock) -> Self {
        Self {
            time_ms: clock.time_millis(),
            frame: clock.frame(),
        }
    }
}

/// Timing state for one task
#[derive(Debug)]
pub struct TaskContext {
    clock: Clock,
    created: Stamp,
    /// Set lazily on the first tick the task is eligible to run
    started: Option<Stamp>,
    frames_elapsed: u64,
    physics_frame_start: u64,
    /// Physics frame observed the last time the task ran
    last_physics_frame: u64,
    /// Render frame the task was last handed to a manager on
    submitted_frame: Option<u64>,
}

impl TaskContext {
    /// Stamp a new context with the clock's current time, frame and
    /// physics frame. The task is not started yet.
    pub fn create(clock: &Clock) -> Self {
        let physics = clock.physics_frames();
        Self {
            clock: clock.clone(),
            created: Stamp::now(clock),
            started: None,
            frames_elapsed: 0,
            physics_frame_start: physics,
            last_physics_frame: physics,
            submitted_frame: None,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn created(&self) -> Stamp {
        self.created
    }

    pub fn started(&self) -> Option<Stamp> {
        self.started
    }

    pub fn submitted_frame(&self) -> Option<u64> {
        self.submitted_frame
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Frames since the task first ran, as of the last tick
    pub fn frames_elapsed(&self) -> u64 {
        self.frames_elapsed
    }

    /// Wall time since the task first ran. Zero until it has started.
    pub fn time_elapsed(&self) -> Duration {
        match self.started {
            Some(start) => {
                Duration::from_millis(self.clock.time_millis().saturating_sub(start.time_ms))
            }
            None => Duration::ZERO,
        }
    }

    /// Physics steps since the task was created
    pub fn physics_frames_elapsed(&self) -> u64 {
        self.clock
            .physics_frames()
            .saturating_sub(self.physics_frame_start)
    }

    /// True while the clock is still on the frame the task was created in
    pub fn is_creation_frame(&self) -> bool {
        self.clock.frame() == self.created.frame
    }

    /// True while the clock is still on the frame the task was submitted in
    pub fn is_submission_frame(&self) -> bool {
        self.submitted_frame == Some(self.clock.frame())
    }

    /// True when a physics step happened since the task last ran
    pub fn physics_advanced(&self) -> bool {
        self.clock.physics_frames() != self.last_physics_frame
    }

    /// Recompute frames elapsed from the clock's current frame
    pub(crate) fn refresh(&mut self) {
        if let Some(start) = self.started {
            self.frames_elapsed = self.clock.frame().saturating_sub(start.frame);
        }
    }

    /// Mark the task as started now. Has no effect once started.
    pub(crate) fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Stamp::now(&self.clock));
            self.frames_elapsed = 0;
        }
    }

    pub(crate) fn record_physics_frame(&mut self) {
        self.last_physics_frame = self.clock.physics_frames();
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.submitted_frame = Some(self.clock.frame());
    }
}

/// Copies the creation and start stamps. The physics link is reset to the
/// clock's current physics frame so a requeued copy waits for the next step,
/// and the copy counts as not yet submitted.
impl Clone for TaskContext {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            created: self.created,
            started: self.started,
            frames_elapsed: self.frames_elapsed,
            physics_frame_start: self.physics_frame_start,
            last_physics_frame: self.clock.physics_frames(),
            submitted_frame: None,
        }
    }
}
