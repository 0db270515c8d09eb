//! Cooperative task scheduling
//!
//! - [`Clock`]: unscaled wall time plus render and physics frame counters
//! - [`Task`]: a callback with durations, a key and a finish policy
//! - [`TaskManager`]: queue, promotion, per-tick execution and retirement
//! - [`Dispatcher`]: thread pool for the background dispatch modes
//! - [`SchedulerTrace`]: bounded event log and counters

pub mod clock;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod task;
pub mod trace;

pub use clock::{Clock, TimeSource};
pub use context::{Stamp, TaskContext};
pub use dispatch::{DispatchMode, Dispatcher, PanicPayload, panic_message};
pub use error::{SchedError, SchedResult};
pub use manager::{ManagerSnapshot, TaskManager, TaskSnapshot};
pub use task::{Action, Priority, Task, TaskBuilder, TaskId, TaskKey};
pub use trace::{SchedulerTrace, TRACE_BUFFER_SIZE, TaskStats, TraceEvent, TraceKind};
