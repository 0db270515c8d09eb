//! Runtime and manager configuration
//!
//! Both structs have sensible defaults, builder-style setters, and can be
//! loaded from JSON. Missing JSON fields fall back to the defaults.

use crate::scheduler::trace::TRACE_BUFFER_SIZE;
use crate::scheduler::{DispatchMode, SchedError, SchedResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker count used when none is configured
pub(crate) fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Configuration for a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Threads in the shared dispatcher pool
    pub worker_threads: usize,
    /// Buffer trace events in every manager the runtime creates
    pub trace_enabled: bool,
    /// Events kept per manager
    pub trace_capacity: usize,
    /// Render frames per second for the native frame loop
    pub target_fps: u32,
    /// Physics steps per second for the native frame loop
    pub physics_hz: u32,
    /// Log manager creation and removal
    pub verbose: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus(),
            trace_enabled: false,
            trace_capacity: TRACE_BUFFER_SIZE,
            target_fps: 60,
            physics_hz: 50,
            verbose: false,
        }
    }
}

impl RuntimeConfig {
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn tracing(mut self, enabled: bool, capacity: usize) -> Self {
        self.trace_enabled = enabled;
        self.trace_capacity = capacity;
        self
    }

    pub fn target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn physics_hz(mut self, hz: u32) -> Self {
        self.physics_hz = hz;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> SchedResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SchedResult<()> {
        if self.worker_threads == 0 {
            return Err(SchedError::InvalidConfig(
                "worker_threads must be at least 1".into(),
            ));
        }
        if self.trace_capacity == 0 {
            return Err(SchedError::InvalidConfig(
                "trace_capacity must be at least 1".into(),
            ));
        }
        if self.target_fps == 0 {
            return Err(SchedError::InvalidConfig("target_fps must be positive".into()));
        }
        if self.physics_hz == 0 {
            return Err(SchedError::InvalidConfig("physics_hz must be positive".into()));
        }
        Ok(())
    }

    /// Time between render frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.target_fps.max(1) as u64)
    }

    /// Time between physics steps
    pub fn physics_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.physics_hz.max(1) as u64)
    }

    /// Manager config carrying this runtime's trace settings
    pub fn manager(&self, name: impl Into<String>) -> ManagerConfig {
        ManagerConfig::new(name).tracing(self.trace_enabled, self.trace_capacity)
    }
}

/// Configuration for a single [`TaskManager`](crate::TaskManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub name: String,
    /// Keep at most one task active at a time
    pub sequential: bool,
    pub dispatch: DispatchMode,
    /// Found by global lookups on the runtime
    pub global: bool,
    pub trace_enabled: bool,
    pub trace_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "Task Manager".to_string(),
            sequential: false,
            dispatch: DispatchMode::Inline,
            global: false,
            trace_enabled: false,
            trace_capacity: TRACE_BUFFER_SIZE,
        }
    }
}

impl ManagerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    pub fn tracing(mut self, enabled: bool, capacity: usize) -> Self {
        self.trace_enabled = enabled;
        self.trace_capacity = capacity;
        self
    }

    pub fn from_json(json: &str) -> SchedResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
