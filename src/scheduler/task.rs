//! Task abstraction
//!
//! A Task is one unit of deferred work: a callback plus the metadata the
//! manager needs to decide when to call it and when to retire it. The
//! callback receives the task itself, so it can read its own timing through
//! [`Task::context`] and finish itself with [`Task::mark_complete`].

use super::clock::Clock;
use super::context::TaskContext;
use super::error::{SchedError, SchedResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Unique identifier for a task, assigned by its manager on submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Caller-chosen deduplication key
///
/// Two tasks with the same key are duplicates of each other. Tasks without
/// a key are never treated as duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TaskKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task priority levels
///
/// Priority only decides where a task lands in the active list when it is
/// promoted, and which queued task a sequential manager promotes next. Equal
/// priorities keep submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum Priority {
    /// Runs ahead of everything else promoted with it
    Critical = 0,
    #[default]
    Normal = 1,
    /// Runs after everything else promoted with it
    Background = 2,
}

/// The callback a task runs each eligible tick
pub type Action = Arc<dyn Fn(&mut Task) + Send + Sync + 'static>;

/// Outcome of the per-tick eligibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eligibility {
    /// Still on the frame the task was created or submitted in
    Fresh,
    /// A declared duration ran out; the task is now complete
    Expired,
    /// Physics-synced and no physics step happened since the last run
    Throttled,
    Run,
}

/// A unit of deferred work
pub struct Task {
    id: Option<TaskId>,
    name: String,
    key: Option<TaskKey>,
    priority: Priority,
    must_finish: bool,
    run_with_physics: bool,
    frame_duration: Option<u64>,
    second_duration: Option<Duration>,
    complete: bool,
    context: TaskContext,
    action: Action,
}

impl Task {
    /// An unbounded, normal priority task that runs until it marks itself
    /// complete
    pub fn new<F>(clock: &Clock, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        Self::builder(clock, name, action).into_task()
    }

    pub fn builder<F>(clock: &Clock, name: impl Into<String>, action: F) -> TaskBuilder
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        TaskBuilder::new(clock, name.into(), Arc::new(action))
    }

    pub fn id(&self) -> Option<TaskId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> Option<&TaskKey> {
        self.key.as_ref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn must_finish(&self) -> bool {
        self.must_finish
    }

    pub fn run_with_physics(&self) -> bool {
        self.run_with_physics
    }

    pub fn frame_duration(&self) -> Option<u64> {
        self.frame_duration
    }

    pub fn second_duration(&self) -> Option<Duration> {
        self.second_duration
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Ask the manager to retire this task on its retirement check.
    /// Must-finish tasks still wait for their durations.
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// True once the frame duration, if any, has been reached
    pub fn frame_limit_reached(&self) -> bool {
        self.frame_duration
            .is_some_and(|limit| self.context.frames_elapsed() >= limit)
    }

    /// True once the second duration, if any, has been reached
    pub fn second_limit_reached(&self) -> bool {
        self.second_duration
            .is_some_and(|limit| self.context.time_elapsed() >= limit)
    }

    /// Both declared durations have elapsed. An undeclared duration counts
    /// as elapsed.
    pub fn durations_satisfied(&self) -> bool {
        let frames_done = self
            .frame_duration
            .is_none_or(|limit| self.context.frames_elapsed() >= limit);
        let seconds_done = self
            .second_duration
            .is_none_or(|limit| self.context.time_elapsed() >= limit);
        frames_done && seconds_done
    }

    /// Whether the manager should drop this task now
    pub fn is_retirable(&self) -> bool {
        self.complete && (!self.must_finish || self.durations_satisfied())
    }

    /// Take the id a manager assigned and stamp the submission frame
    pub(crate) fn submit(&mut self, id: TaskId) {
        self.id = Some(id);
        self.context.mark_submitted();
    }

    pub(crate) fn refresh(&mut self) {
        self.context.refresh();
    }

    /// Decide whether the action runs this tick, starting the task and
    /// forcing completion on expiry as a side effect
    pub(crate) fn prepare(&mut self) -> Eligibility {
        if self.context.is_creation_frame() || self.context.is_submission_frame() {
            return Eligibility::Fresh;
        }

        self.context.start();

        if self.frame_limit_reached() || self.second_limit_reached() {
            self.complete = true;
            return Eligibility::Expired;
        }

        if self.run_with_physics {
            if !self.context.physics_advanced() {
                return Eligibility::Throttled;
            }
            self.context.record_physics_frame();
        }

        Eligibility::Run
    }

    /// Run the action once with this task
    pub(crate) fn invoke(&mut self) {
        let action = Arc::clone(&self.action);
        action(self);
    }
}

/// A copy with a duplicated context and the same callback. The copy has no
/// id and is not complete, so it can be submitted again.
impl Clone for Task {
    fn clone(&self) -> Self {
        Self {
            id: None,
            name: self.name.clone(),
            key: self.key.clone(),
            priority: self.priority,
            must_finish: self.must_finish,
            run_with_physics: self.run_with_physics,
            frame_duration: self.frame_duration,
            second_duration: self.second_duration,
            complete: false,
            context: self.context.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("must_finish", &self.must_finish)
            .field("run_with_physics", &self.run_with_physics)
            .field("frame_duration", &self.frame_duration)
            .field("second_duration", &self.second_duration)
            .field("complete", &self.complete)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Builder for tasks with durations, keys or a finish policy
pub struct TaskBuilder {
    name: String,
    action: Action,
    context: TaskContext,
    key: Option<TaskKey>,
    priority: Priority,
    must_finish: bool,
    run_with_physics: bool,
    frame_duration: Option<u64>,
    second_duration: Option<Duration>,
}

impl TaskBuilder {
    fn new(clock: &Clock, name: String, action: Action) -> Self {
        Self {
            name,
            action,
            context: TaskContext::create(clock),
            key: None,
            priority: Priority::Normal,
            must_finish: false,
            run_with_physics: false,
            frame_duration: None,
            second_duration: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn key(mut self, key: impl Into<TaskKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Keep the task until its durations elapse, even after it marks
    /// itself complete
    pub fn must_finish(mut self, must_finish: bool) -> Self {
        self.must_finish = must_finish;
        self
    }

    /// Complete automatically once this many frames have elapsed
    pub fn frames(mut self, frames: u64) -> Self {
        self.frame_duration = Some(frames);
        self
    }

    /// Complete automatically once this much wall time has elapsed
    pub fn seconds(mut self, duration: Duration) -> Self {
        self.second_duration = Some(duration);
        self
    }

    /// Run at most once per physics step
    pub fn with_physics(mut self, run_with_physics: bool) -> Self {
        self.run_with_physics = run_with_physics;
        self
    }

    /// Build the task. A must-finish task has to declare at least one
    /// duration, otherwise it could never retire.
    pub fn build(self) -> SchedResult<Task> {
        if self.must_finish && self.frame_duration.is_none() && self.second_duration.is_none() {
            return Err(SchedError::MustFinishWithoutDuration { name: self.name });
        }
        Ok(self.into_task())
    }

    pub(crate) fn into_task(self) -> Task {
        Task {
            id: None,
            name: self.name,
            key: self.key,
            priority: self.priority,
            must_finish: self.must_finish,
            run_with_physics: self.run_with_physics,
            frame_duration: self.frame_duration,
            second_duration: self.second_duration,
            complete: false,
            context: self.context,
            action: self.action,
        }
    }
}
