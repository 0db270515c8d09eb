//! Scheduler tracing
//!
//! Each manager keeps a bounded ring buffer of lifecycle events and a set of
//! counters. Counters are always maintained; events are only buffered while
//! tracing is enabled.

use super::task::TaskId;
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of events kept per manager
pub const TRACE_BUFFER_SIZE: usize = 1000;

/// What happened to a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceKind {
    /// Accepted into the queue
    Submitted,
    /// Rejected as a duplicate of a live key
    Suppressed,
    /// Moved from the queue to the active list
    Promoted,
    /// First eligible tick
    Started,
    /// Action ran
    Invoked,
    /// A declared duration ran out
    Expired,
    /// Removed from the active list after completing
    Retired,
    /// Removed by an explicit cancel
    Cancelled,
}

impl std::fmt::Display for TraceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceKind::Submitted => write!(f, "SUBMIT"),
            TraceKind::Suppressed => write!(f, "DUP"),
            TraceKind::Promoted => write!(f, "PROMOTE"),
            TraceKind::Started => write!(f, "START"),
            TraceKind::Invoked => write!(f, "RUN"),
            TraceKind::Expired => write!(f, "EXPIRE"),
            TraceKind::Retired => write!(f, "RETIRE"),
            TraceKind::Cancelled => write!(f, "CANCEL"),
        }
    }
}

/// A single trace event
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    /// Render frame the event happened on
    pub frame: u64,
    pub kind: TraceKind,
    /// Task id, absent for suppressed submissions
    pub task: Option<TaskId>,
    pub name: String,
}

impl std::fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.task {
            Some(id) => write!(f, "[{:>6}] {:<7} {} {}", self.frame, self.kind, id, self.name),
            None => write!(f, "[{:>6}] {:<7} {}", self.frame, self.kind, self.name),
        }
    }
}

/// Lifetime counters for one manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub ticks: u64,
    pub submitted: u64,
    pub suppressed: u64,
    pub promoted: u64,
    pub invocations: u64,
    pub expired: u64,
    pub retired: u64,
    pub cancelled: u64,
}

impl TaskStats {
    /// Average invocations per tick
    pub fn avg_invocations_per_tick(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.invocations as f64 / self.ticks as f64
        }
    }
}

/// Event buffer plus counters
#[derive(Debug)]
pub struct SchedulerTrace {
    enabled: bool,
    capacity: usize,
    events: VecDeque<TraceEvent>,
    stats: TaskStats,
}

impl SchedulerTrace {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            capacity: capacity.max(1),
            events: VecDeque::new(),
            stats: TaskStats::default(),
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count the event and buffer it if tracing is on
    pub fn record(&mut self, frame: u64, kind: TraceKind, task: Option<TaskId>, name: &str) {
        match kind {
            TraceKind::Submitted => self.stats.submitted += 1,
            TraceKind::Suppressed => self.stats.suppressed += 1,
            TraceKind::Promoted => self.stats.promoted += 1,
            TraceKind::Started => {}
            TraceKind::Invoked => self.stats.invocations += 1,
            TraceKind::Expired => self.stats.expired += 1,
            TraceKind::Retired => self.stats.retired += 1,
            TraceKind::Cancelled => self.stats.cancelled += 1,
        }

        if !self.enabled {
            return;
        }

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(TraceEvent {
            frame,
            kind,
            task,
            name: name.to_string(),
        });
    }

    pub(crate) fn record_tick(&mut self) {
        self.stats.ticks += 1;
    }

    pub fn events(&self) -> &VecDeque<TraceEvent> {
        &self.events
    }

    /// Buffered events for one task, oldest first
    pub fn events_for(&self, task: TaskId) -> Vec<&TraceEvent> {
        self.events.iter().filter(|e| e.task == Some(task)).collect()
    }

    pub fn events_of(&self, kind: TraceKind) -> Vec<&TraceEvent> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Reset everything (events and stats)
    pub fn reset(&mut self) {
        self.clear_events();
        self.stats = TaskStats::default();
    }
}

impl Default for SchedulerTrace {
    fn default() -> Self {
        Self::new(false, TRACE_BUFFER_SIZE)
    }
}
