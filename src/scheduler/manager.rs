//! Frame-driven task manager
//!
//! A `TaskManager` owns a queue of submitted tasks and a list of active
//! ones. The host calls [`TaskManager::tick`] once per render frame:
//! 1. frames-elapsed counters of active tasks are refreshed
//! 2. queued tasks are promoted (all of them, or one at a time when the
//!    manager is sequential and nothing is active)
//! 3. every active task is checked, run if eligible, and retired once it is
//!    complete and its finish policy allows it
//!
//! A task never runs on the frame it was created or submitted in. Panics
//! raised by task actions are not caught: they unwind out of `tick` and the
//! remaining tasks of that tick do not run. Every task, the panicking one
//! included, stays in the manager.

use super::clock::Clock;
use super::dispatch::{DispatchMode, Dispatcher, Returned};
use super::error::SchedResult;
use super::task::{Eligibility, Priority, Task, TaskId, TaskKey};
use super::trace::{SchedulerTrace, TaskStats, TraceKind};
use crate::config::{ManagerConfig, num_cpus};
use crate::console_log;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::panic::resume_unwind;

/// Debug view of one active task
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: Option<TaskId>,
    pub name: String,
    pub priority: Priority,
    pub complete: bool,
    pub must_finish: bool,
    pub time_elapsed_secs: f64,
    pub frames_elapsed: u64,
    pub physics_frames_elapsed: u64,
}

impl TaskSnapshot {
    fn of(task: &Task) -> Self {
        Self {
            id: task.id(),
            name: task.name().to_string(),
            priority: task.priority(),
            complete: task.is_complete(),
            must_finish: task.must_finish(),
            time_elapsed_secs: task.context().time_elapsed().as_secs_f64(),
            frames_elapsed: task.context().frames_elapsed(),
            physics_frames_elapsed: task.context().physics_frames_elapsed(),
        }
    }
}

impl std::fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Task: {} - Complete: {} - Time Elapsed: {:.3} - Frames Elapsed: {}",
            self.name, self.complete, self.time_elapsed_secs, self.frames_elapsed
        )
    }
}

/// Debug view of a manager
#[derive(Debug, Clone, Serialize)]
pub struct ManagerSnapshot {
    pub name: String,
    pub global: bool,
    pub sequential: bool,
    pub dispatch: DispatchMode,
    pub frame: u64,
    pub queued: usize,
    pub active: Vec<TaskSnapshot>,
    pub stats: TaskStats,
}

/// The task manager - runs tasks cooperatively, one tick per frame
#[derive(Debug)]
pub struct TaskManager {
    name: String,
    clock: Clock,
    sequential: bool,
    dispatch: DispatchMode,
    dispatcher: Option<Dispatcher>,
    global: bool,

    /// Submitted but not yet promoted, in submission order
    queued: VecDeque<Task>,

    /// Promoted tasks, in run order
    active: Vec<Task>,

    /// Live keys across `queued` and `active`, with multiplicity
    keys: HashMap<TaskKey, usize>,

    next_id: u64,
    trace: SchedulerTrace,
}

impl TaskManager {
    /// A concurrent manager that runs actions inline
    pub fn new(name: impl Into<String>, clock: &Clock) -> Self {
        Self {
            name: name.into(),
            clock: clock.clone(),
            sequential: false,
            dispatch: DispatchMode::Inline,
            dispatcher: None,
            global: false,
            queued: VecDeque::new(),
            active: Vec::new(),
            keys: HashMap::new(),
            next_id: 0,
            trace: SchedulerTrace::default(),
        }
    }

    /// Build a manager from config. `dispatcher` is used for background
    /// modes; one is started if the mode needs it and none is given.
    pub fn with_config(
        clock: &Clock,
        config: &ManagerConfig,
        dispatcher: Option<Dispatcher>,
    ) -> SchedResult<Self> {
        let mut manager = Self::new(config.name.clone(), clock);
        manager.sequential = config.sequential;
        manager.global = config.global;
        manager.dispatcher = dispatcher;
        manager.trace = SchedulerTrace::new(config.trace_enabled, config.trace_capacity);
        manager.set_dispatch_mode(config.dispatch)?;
        Ok(manager)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    /// Sequential managers keep at most one task active at a time
    pub fn set_sequential(&mut self, sequential: bool) {
        self.sequential = sequential;
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch
    }

    /// Switch dispatch mode, starting a dispatcher if the new mode needs one
    ///
    /// A manager without a dispatcher gets a private pool sized to the
    /// machine. Managers registered with a runtime should switch through
    /// [`Runtime::set_dispatch_mode`](crate::Runtime::set_dispatch_mode),
    /// which hands over the runtime's shared pool first.
    pub fn set_dispatch_mode(&mut self, mode: DispatchMode) -> SchedResult<()> {
        if mode.needs_pool() && self.dispatcher.is_none() {
            let dispatcher = Dispatcher::new(num_cpus())?;
            console_log!(
                "[sched] {}: started dispatcher with {} threads",
                self.name,
                dispatcher.threads()
            );
            self.dispatcher = Some(dispatcher);
        }
        self.dispatch = mode;
        Ok(())
    }

    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    pub fn set_dispatcher(&mut self, dispatcher: Dispatcher) {
        self.dispatcher = Some(dispatcher);
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub(crate) fn set_global(&mut self, global: bool) {
        self.global = global;
    }

    pub fn trace(&self) -> &SchedulerTrace {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut SchedulerTrace {
        &mut self.trace
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Queue a task. Unless `allow_duplicates` is set, a task whose key is
    /// already queued or active is dropped and `None` is returned.
    pub fn add_task(&mut self, mut task: Task, allow_duplicates: bool) -> Option<TaskId> {
        let frame = self.clock.frame();

        if !allow_duplicates
            && let Some(key) = task.key()
            && self.keys.contains_key(key)
        {
            self.trace
                .record(frame, TraceKind::Suppressed, None, task.name());
            return None;
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;
        task.submit(id);

        if let Some(key) = task.key() {
            *self.keys.entry(key.clone()).or_insert(0) += 1;
        }

        self.trace
            .record(frame, TraceKind::Submitted, Some(id), task.name());
        self.queued.push_back(task);
        Some(id)
    }

    /// Queue an unbounded task built from a bare action. The name doubles
    /// as the deduplication key.
    pub fn add_action<F>(
        &mut self,
        name: &str,
        action: F,
        run_with_physics: bool,
        allow_duplicates: bool,
    ) -> Option<TaskId>
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        let task = Task::builder(&self.clock, name, action)
            .key(name)
            .with_physics(run_with_physics)
            .into_task();
        self.add_task(task, allow_duplicates)
    }

    /// Run `action` once, on the next frame
    pub fn do_next_frame<F>(&mut self, action: F, run_with_physics: bool) -> TaskId
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        self.do_for_frames(action, 1, run_with_physics)
    }

    /// Run `action` on each of the next `frames` frames
    pub fn do_for_frames<F>(&mut self, action: F, frames: u64, run_with_physics: bool) -> TaskId
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        let task = Task::builder(&self.clock, format!("Do For {} Frames", frames), action)
            .frames(frames)
            .with_physics(run_with_physics)
            .into_task();
        self.enqueue(task)
    }

    /// Keyless tasks are never suppressed
    fn enqueue(&mut self, mut task: Task) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        task.submit(id);
        self.trace
            .record(self.clock.frame(), TraceKind::Submitted, Some(id), task.name());
        self.queued.push_back(task);
        id
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Remove a queued or active task. Returns true if it existed.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let removed = if let Some(pos) = self.queued.iter().position(|t| t.id() == Some(id)) {
            self.queued.remove(pos)
        } else if let Some(pos) = self.active.iter().position(|t| t.id() == Some(id)) {
            Some(self.active.remove(pos))
        } else {
            None
        };

        match removed {
            Some(task) => {
                self.drop_task(task, TraceKind::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Remove every queued or active task carrying `key`
    pub fn cancel_key(&mut self, key: &TaskKey) -> usize {
        let mut removed = Vec::new();

        let queued = std::mem::take(&mut self.queued);
        for task in queued {
            if task.key() == Some(key) {
                removed.push(task);
            } else {
                self.queued.push_back(task);
            }
        }

        let active = std::mem::take(&mut self.active);
        for task in active {
            if task.key() == Some(key) {
                removed.push(task);
            } else {
                self.active.push(task);
            }
        }

        let count = removed.len();
        for task in removed {
            self.drop_task(task, TraceKind::Cancelled);
        }
        count
    }

    /// Cancel everything
    pub fn clear(&mut self) -> usize {
        let mut tasks: Vec<Task> = self.queued.drain(..).collect();
        tasks.append(&mut self.active);
        let count = tasks.len();
        for task in tasks {
            self.drop_task(task, TraceKind::Cancelled);
        }
        count
    }

    fn drop_task(&mut self, task: Task, kind: TraceKind) {
        if let Some(key) = task.key()
            && let Some(count) = self.keys.get_mut(key)
        {
            *count -= 1;
            if *count == 0 {
                self.keys.remove(key);
            }
        }
        self.trace
            .record(self.clock.frame(), kind, task.id(), task.name());
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one tick of the scheduler
    ///
    /// Returns the number of actions invoked. Call this once per frame,
    /// after advancing the clock's frame counter.
    pub fn tick(&mut self) -> usize {
        self.trace.record_tick();
        let frame = self.clock.frame();

        for task in &mut self.active {
            task.refresh();
        }

        self.promote(frame);

        if self.active.is_empty() {
            return 0;
        }

        match (self.dispatch, self.dispatcher.clone()) {
            (DispatchMode::Parallel, Some(dispatcher)) => self.run_parallel(frame, &dispatcher),
            (DispatchMode::Offloaded, Some(dispatcher)) => self.run_in_order(frame, Some(&dispatcher)),
            _ => self.run_in_order(frame, None),
        }
    }

    fn promote(&mut self, frame: u64) {
        if self.sequential {
            if !self.active.is_empty() {
                return;
            }
            // Highest priority first, oldest first among equals
            let next = self
                .queued
                .iter()
                .enumerate()
                .min_by_key(|(_, task)| task.priority())
                .map(|(pos, _)| pos);
            if let Some(pos) = next
                && let Some(task) = self.queued.remove(pos)
            {
                note(&mut self.trace, frame, TraceKind::Promoted, &task);
                self.active.push(task);
            }
        } else {
            while let Some(task) = self.queued.pop_front() {
                note(&mut self.trace, frame, TraceKind::Promoted, &task);
                // Stable: after every active task of equal or higher priority
                let pos = self
                    .active
                    .iter()
                    .position(|t| t.priority() > task.priority())
                    .unwrap_or(self.active.len());
                self.active.insert(pos, task);
            }
        }
    }

    /// Run the eligibility check for the task at `pos`
    fn check(&mut self, frame: u64, pos: usize) -> bool {
        let task = &mut self.active[pos];
        let was_started = task.context().is_started();
        let eligibility = task.prepare();

        if !was_started && task.context().is_started() {
            note(&mut self.trace, frame, TraceKind::Started, task);
        }
        match eligibility {
            Eligibility::Expired => {
                note(&mut self.trace, frame, TraceKind::Expired, task);
                false
            }
            Eligibility::Run => true,
            Eligibility::Fresh | Eligibility::Throttled => false,
        }
    }

    /// Inline and offloaded modes: check, run and retire each task in turn
    fn run_in_order(&mut self, frame: u64, dispatcher: Option<&Dispatcher>) -> usize {
        let mut invoked = 0;
        let mut pos = 0;

        while pos < self.active.len() {
            if self.check(frame, pos) {
                note(&mut self.trace, frame, TraceKind::Invoked, &self.active[pos]);
                invoked += 1;

                match dispatcher {
                    Some(dispatcher) => {
                        let task = self.active.remove(pos);
                        let name = task.name().to_string();
                        let key = task.key().cloned();
                        match dispatcher.run_one(task) {
                            Some(Returned { task, panic }) => {
                                self.active.insert(pos, task);
                                if let Some(payload) = panic {
                                    resume_unwind(payload);
                                }
                            }
                            None => {
                                self.lose_task(&name, key);
                                continue;
                            }
                        }
                    }
                    None => self.active[pos].invoke(),
                }
            }

            if self.active[pos].is_retirable() {
                let task = self.active.remove(pos);
                self.drop_task(task, TraceKind::Retired);
            } else {
                pos += 1;
            }
        }

        invoked
    }

    /// Parallel mode: check every task, fan out the eligible ones, join,
    /// then retire in list order
    fn run_parallel(&mut self, frame: u64, dispatcher: &Dispatcher) -> usize {
        let eligible: Vec<bool> = (0..self.active.len())
            .map(|pos| self.check(frame, pos))
            .collect();

        let tasks = std::mem::take(&mut self.active);
        let mut slots: Vec<Option<Task>> = Vec::with_capacity(tasks.len());
        let mut outgoing = Vec::new();
        let mut sent = Vec::new();

        for (pos, (task, run)) in tasks.into_iter().zip(eligible).enumerate() {
            if run {
                note(&mut self.trace, frame, TraceKind::Invoked, &task);
                sent.push((pos, task.name().to_string(), task.key().cloned()));
                outgoing.push(task);
                slots.push(None);
            } else {
                slots.push(Some(task));
            }
        }

        let invoked = outgoing.len();
        let mut first_panic = None;

        for ((pos, name, key), returned) in sent.into_iter().zip(dispatcher.run_all(outgoing)) {
            match returned {
                Some(Returned { task, panic }) => {
                    slots[pos] = Some(task);
                    if first_panic.is_none() {
                        first_panic = panic;
                    }
                }
                None => self.lose_task(&name, key),
            }
        }

        self.active = slots.into_iter().flatten().collect();

        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }

        let mut pos = 0;
        while pos < self.active.len() {
            if self.active[pos].is_retirable() {
                let task = self.active.remove(pos);
                self.drop_task(task, TraceKind::Retired);
            } else {
                pos += 1;
            }
        }

        invoked
    }

    /// A worker dropped a task without handing it back
    fn lose_task(&mut self, name: &str, key: Option<TaskKey>) {
        console_log!("[sched] {}: task '{}' was lost by the dispatcher", self.name, name);
        if let Some(key) = key
            && let Some(count) = self.keys.get_mut(&key)
        {
            *count -= 1;
            if *count == 0 {
                self.keys.remove(&key);
            }
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn queued(&self) -> impl Iterator<Item = &Task> {
        self.queued.iter()
    }

    pub fn active(&self) -> &[Task] {
        &self.active
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn task_count(&self) -> usize {
        self.queued.len() + self.active.len()
    }

    pub fn has_tasks(&self) -> bool {
        !self.queued.is_empty() || !self.active.is_empty()
    }

    /// Whether a task with this key is queued or active
    pub fn contains_key(&self, key: &TaskKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.queued
            .iter()
            .chain(self.active.iter())
            .find(|t| t.id() == Some(id))
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            name: self.name.clone(),
            global: self.global,
            sequential: self.sequential,
            dispatch: self.dispatch,
            frame: self.clock.frame(),
            queued: self.queued.len(),
            active: self.active.iter().map(TaskSnapshot::of).collect(),
            stats: self.trace.stats().clone(),
        }
    }
}

fn note(trace: &mut SchedulerTrace, frame: u64, kind: TraceKind, task: &Task) {
    trace.record(frame, kind, task.id(), task.name());
}
