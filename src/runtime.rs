//! Application root
//!
//! A `Runtime` owns the clock, the shared dispatcher pool and every task
//! manager of an application. Hosts call [`Runtime::frame`] once per render
//! frame and [`Runtime::physics_step`] once per fixed physics step.
//!
//! Managers live in a slab and are addressed by [`ManagerId`]. One of them
//! can be the global manager, found through [`Runtime::global_instance`];
//! subsystems that want their own global use [`Runtime::global_named`].

use crate::config::{ManagerConfig, RuntimeConfig};
use crate::console_log;
use crate::scheduler::{
    Clock, DispatchMode, Dispatcher, ManagerSnapshot, SchedError, SchedResult, SchedulerTrace,
    TaskManager,
};
use serde::Serialize;
use slab::Slab;
use std::collections::HashMap;

/// Name of the manager created by [`Runtime::global_instance`]
pub const GLOBAL_MANAGER_NAME: &str = "Global Task Manager";

/// Handle to a manager registered with a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ManagerId(pub usize);

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Manager({})", self.0)
    }
}

/// Everything the debug view shows
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeReport {
    pub time_ms: u64,
    pub frame: u64,
    pub physics_frame: u64,
    pub managers: Vec<ManagerSnapshot>,
}

pub struct Runtime {
    config: RuntimeConfig,
    clock: Clock,
    /// Started on first use by a background manager
    dispatcher: Option<Dispatcher>,
    managers: Slab<TaskManager>,
    /// Registration order, which is also tick order
    order: Vec<ManagerId>,
    global: Option<ManagerId>,
    named_globals: HashMap<String, ManagerId>,
}

impl Runtime {
    /// A runtime on the system clock
    pub fn new(config: RuntimeConfig) -> SchedResult<Self> {
        Self::with_clock(Clock::system(), config)
    }

    pub fn with_clock(clock: Clock, config: RuntimeConfig) -> SchedResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            dispatcher: None,
            managers: Slab::new(),
            order: Vec::new(),
            global: None,
            named_globals: HashMap::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a concurrent, inline manager
    pub fn new_task_manager(&mut self, name: impl Into<String>) -> ManagerId {
        let mut manager = TaskManager::new(name, &self.clock);
        *manager.trace_mut() =
            SchedulerTrace::new(self.config.trace_enabled, self.config.trace_capacity);
        if let Some(dispatcher) = &self.dispatcher {
            manager.set_dispatcher(dispatcher.clone());
        }
        self.register(manager)
    }

    /// Register a manager from config. Background modes share the runtime's
    /// dispatcher, which is started here if needed.
    pub fn new_task_manager_with(&mut self, config: ManagerConfig) -> SchedResult<ManagerId> {
        let dispatcher = if config.dispatch.needs_pool() {
            Some(self.shared_dispatcher()?)
        } else {
            self.dispatcher.clone()
        };
        let manager = TaskManager::with_config(&self.clock, &config, dispatcher)?;
        Ok(self.register(manager))
    }

    fn register(&mut self, manager: TaskManager) -> ManagerId {
        if self.config.verbose {
            console_log!(
                "[runtime] registered '{}' (sequential: {}, dispatch: {:?})",
                manager.name(),
                manager.is_sequential(),
                manager.dispatch_mode()
            );
        }
        let id = ManagerId(self.managers.insert(manager));
        self.order.push(id);
        id
    }

    /// Switch a registered manager's dispatch mode. Background modes run on
    /// the runtime's shared dispatcher, which is started here if needed.
    pub fn set_dispatch_mode(&mut self, id: ManagerId, mode: DispatchMode) -> SchedResult<()> {
        if !self.managers.contains(id.0) {
            return Err(SchedError::UnknownManager(id));
        }
        let dispatcher = if mode.needs_pool() {
            Some(self.shared_dispatcher()?)
        } else {
            None
        };
        let manager = self
            .managers
            .get_mut(id.0)
            .ok_or(SchedError::UnknownManager(id))?;
        if let Some(dispatcher) = dispatcher {
            manager.set_dispatcher(dispatcher);
        }
        manager.set_dispatch_mode(mode)
    }

    /// The shared dispatcher, once a background manager has started it
    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    fn shared_dispatcher(&mut self) -> SchedResult<Dispatcher> {
        if let Some(dispatcher) = &self.dispatcher {
            return Ok(dispatcher.clone());
        }
        let dispatcher = Dispatcher::new(self.config.worker_threads)?;
        console_log!("[dispatch] started {} worker threads", dispatcher.threads());
        self.dispatcher = Some(dispatcher.clone());
        Ok(dispatcher)
    }

    pub fn manager(&self, id: ManagerId) -> Option<&TaskManager> {
        self.managers.get(id.0)
    }

    pub fn manager_mut(&mut self, id: ManagerId) -> Option<&mut TaskManager> {
        self.managers.get_mut(id.0)
    }

    /// Unregister a manager and hand it back. Its tasks are not run again.
    pub fn remove_manager(&mut self, id: ManagerId) -> SchedResult<TaskManager> {
        let manager = self
            .managers
            .try_remove(id.0)
            .ok_or(SchedError::UnknownManager(id))?;

        self.order.retain(|&other| other != id);
        if self.global == Some(id) {
            self.global = None;
        }
        self.named_globals.retain(|_, &mut other| other != id);

        if self.config.verbose {
            console_log!("[runtime] removed '{}'", manager.name());
        }
        Ok(manager)
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    /// Managers in tick order
    pub fn managers(&self) -> impl Iterator<Item = (ManagerId, &TaskManager)> {
        self.order
            .iter()
            .filter_map(|&id| self.managers.get(id.0).map(|m| (id, m)))
    }

    // ------------------------------------------------------------------
    // Global lookup
    // ------------------------------------------------------------------

    /// The global manager
    ///
    /// Returns the cached one if it is still registered. Otherwise adopts
    /// the first registered manager flagged global and called
    /// [`GLOBAL_MANAGER_NAME`], or creates one. Globals under other names
    /// belong to [`Runtime::global_named`].
    pub fn global_instance(&mut self) -> &mut TaskManager {
        let cached = self.global.filter(|id| self.managers.contains(id.0));
        let id = match cached {
            Some(id) => id,
            None => {
                let id = match self.find_global(GLOBAL_MANAGER_NAME) {
                    Some(id) => id,
                    None => self.create_global(GLOBAL_MANAGER_NAME),
                };
                self.global = Some(id);
                id
            }
        };
        &mut self.managers[id.0]
    }

    /// The global manager for one subsystem, looked up by name
    pub fn global_named(&mut self, name: &str) -> &mut TaskManager {
        let cached = self
            .named_globals
            .get(name)
            .copied()
            .filter(|id| self.managers.contains(id.0));
        let id = match cached {
            Some(id) => id,
            None => {
                let id = match self.find_global(name) {
                    Some(id) => id,
                    None => self.create_global(name),
                };
                self.named_globals.insert(name.to_string(), id);
                id
            }
        };
        &mut self.managers[id.0]
    }

    /// Id of the cached global manager, if one has been looked up
    pub fn global_id(&self) -> Option<ManagerId> {
        self.global.filter(|id| self.managers.contains(id.0))
    }

    /// First registered manager flagged global under `name`
    fn find_global(&self, name: &str) -> Option<ManagerId> {
        self.order.iter().copied().find(|id| {
            self.managers
                .get(id.0)
                .is_some_and(|m| m.is_global() && m.name() == name)
        })
    }

    fn create_global(&mut self, name: &str) -> ManagerId {
        let id = self.new_task_manager(name);
        if let Some(manager) = self.managers.get_mut(id.0) {
            manager.set_global(true);
        }
        console_log!("[runtime] created global manager '{}'", name);
        id
    }

    // ------------------------------------------------------------------
    // Host hooks
    // ------------------------------------------------------------------

    /// Advance the render frame and tick every manager in registration
    /// order. Returns the number of actions invoked.
    pub fn frame(&mut self) -> usize {
        self.clock.advance_frame();
        let mut invoked = 0;
        for id in &self.order {
            if let Some(manager) = self.managers.get_mut(id.0) {
                invoked += manager.tick();
            }
        }
        invoked
    }

    /// Advance the physics counter. Call once per fixed physics step.
    pub fn physics_step(&mut self) -> u64 {
        self.clock.advance_physics_frame()
    }

    // ------------------------------------------------------------------
    // Debugging
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> Vec<ManagerSnapshot> {
        self.managers().map(|(_, m)| m.snapshot()).collect()
    }

    pub fn report(&self) -> RuntimeReport {
        RuntimeReport {
            time_ms: self.clock.time_millis(),
            frame: self.clock.frame(),
            physics_frame: self.clock.physics_frames(),
            managers: self.snapshot(),
        }
    }

    /// The report as pretty JSON
    pub fn report_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.report())
    }

    /// One line per manager followed by one line per active task
    pub fn debug_report(&self) -> String {
        let mut out = String::new();
        for snapshot in self.snapshot() {
            out.push_str(&format!(
                "{} ({} active, {} queued)\n",
                snapshot.name,
                snapshot.active.len(),
                snapshot.queued
            ));
            for task in &snapshot.active {
                out.push_str(&format!("  {}\n", task));
            }
        }
        out
    }

    /// Drop every manager, its tasks, and the dispatcher
    pub fn shutdown(&mut self) {
        let mut cancelled = 0;
        for (_, manager) in self.managers.iter_mut() {
            cancelled += manager.clear();
        }
        let count = self.managers.len();

        self.managers.clear();
        self.order.clear();
        self.global = None;
        self.named_globals.clear();
        self.dispatcher = None;

        console_log!(
            "[runtime] shutdown: {} managers, {} tasks cancelled",
            count,
            cancelled
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Task;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runtime() -> Runtime {
        Runtime::with_clock(Clock::manual(0), RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn test_manager_id_display() {
        assert_eq!(ManagerId(3).to_string(), "Manager(3)");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RuntimeConfig::default().target_fps(0);
        assert!(matches!(
            Runtime::with_clock(Clock::manual(0), config),
            Err(SchedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_global_instance_is_cached() {
        let mut rt = runtime();
        assert_eq!(rt.global_instance().name(), GLOBAL_MANAGER_NAME);
        let first = rt.global_id();
        rt.global_instance();
        assert_eq!(rt.global_id(), first);
        assert_eq!(rt.manager_count(), 1);
        assert!(rt.global_instance().is_global());
    }

    #[test]
    fn test_global_instance_adopts_registered() {
        let mut rt = runtime();
        rt.new_task_manager("plain");
        let main = rt
            .new_task_manager_with(ManagerConfig::new(GLOBAL_MANAGER_NAME).global(true))
            .unwrap();

        assert_eq!(rt.global_instance().name(), GLOBAL_MANAGER_NAME);
        assert_eq!(rt.global_id(), Some(main));
        assert_eq!(rt.manager_count(), 2);
    }

    #[test]
    fn test_named_global_not_shared_with_global_instance() {
        let mut rt = runtime();
        let destructibles = rt
            .new_task_manager_with(ManagerConfig::new("Destructibles").global(true))
            .unwrap();

        assert_eq!(rt.global_instance().name(), GLOBAL_MANAGER_NAME);
        let global = rt.global_id().unwrap();
        assert_ne!(global, destructibles);

        rt.global_named("Destructibles")
            .add_action("crumble", |_| {}, false, false);
        assert_eq!(rt.manager(destructibles).unwrap().task_count(), 1);
        assert_eq!(rt.manager(global).unwrap().task_count(), 0);
        assert_eq!(rt.manager_count(), 2);
    }

    #[test]
    fn test_global_rediscovered_after_removal() {
        let mut rt = runtime();
        rt.global_instance();
        let old = rt.global_id().unwrap();
        rt.remove_manager(old).unwrap();
        assert_eq!(rt.global_id(), None);

        assert_eq!(rt.global_instance().name(), GLOBAL_MANAGER_NAME);
        assert_eq!(rt.manager_count(), 1);
    }

    #[test]
    fn test_named_globals_are_separate() {
        let mut rt = runtime();
        rt.global_named("Destructibles").do_next_frame(|_| {}, false);
        rt.global_instance();

        assert_eq!(rt.manager_count(), 2);
        assert_eq!(rt.global_named("Destructibles").task_count(), 1);
        assert_eq!(rt.global_instance().task_count(), 0);
    }

    #[test]
    fn test_frame_ticks_managers_in_order() {
        let mut rt = runtime();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = rt.new_task_manager("first");
        let second = rt.new_task_manager("second");

        for (id, label) in [(second, "second"), (first, "first")] {
            let order = order.clone();
            let clock = rt.clock().clone();
            rt.manager_mut(id).unwrap().add_task(
                Task::new(&clock, label, move |task| {
                    order.lock().unwrap().push(task.name().to_string());
                }),
                false,
            );
        }

        assert_eq!(rt.frame(), 2);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(rt.clock().frame(), 1);
    }

    #[test]
    fn test_physics_step_drives_physics_tasks() {
        let mut rt = runtime();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        rt.global_instance().add_action(
            "physics",
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            true,
            false,
        );

        for _ in 0..3 {
            assert!(rt.physics_step() > 0);
            rt.frame();
            rt.frame();
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_remove_unknown_manager() {
        let mut rt = runtime();
        let id = rt.new_task_manager("gone");
        rt.remove_manager(id).unwrap();
        assert_eq!(
            rt.remove_manager(id).unwrap_err(),
            SchedError::UnknownManager(id)
        );
        assert!(rt.manager(id).is_none());
    }

    #[test]
    fn test_background_managers_share_dispatcher() {
        let mut rt = Runtime::with_clock(
            Clock::manual(0),
            RuntimeConfig::default().worker_threads(2),
        )
        .unwrap();
        let a = rt
            .new_task_manager_with(ManagerConfig::new("a").dispatch(DispatchMode::Parallel))
            .unwrap();
        let b = rt
            .new_task_manager_with(ManagerConfig::new("b").dispatch(DispatchMode::Offloaded))
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        for id in [a, b] {
            let clock = rt.clock().clone();
            let seen = count.clone();
            rt.manager_mut(id).unwrap().add_task(
                Task::new(&clock, "work", move |task| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    task.mark_complete();
                }),
                false,
            );
        }

        assert_eq!(rt.frame(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(rt.snapshot().iter().all(|m| m.active.is_empty()));
    }

    #[test]
    fn test_set_dispatch_mode_uses_shared_pool() {
        let mut rt = Runtime::with_clock(
            Clock::manual(0),
            RuntimeConfig::default().worker_threads(3),
        )
        .unwrap();
        let first = rt.new_task_manager("first");
        let second = rt.new_task_manager("second");
        assert!(rt.dispatcher().is_none());

        rt.set_dispatch_mode(first, DispatchMode::Parallel).unwrap();
        rt.set_dispatch_mode(second, DispatchMode::Offloaded).unwrap();

        assert_eq!(rt.dispatcher().map(Dispatcher::threads), Some(3));
        for id in [first, second] {
            let manager = rt.manager(id).unwrap();
            assert_eq!(manager.dispatcher().map(Dispatcher::threads), Some(3));
        }
        assert_eq!(
            rt.manager(first).unwrap().dispatch_mode(),
            DispatchMode::Parallel
        );

        // Registered after the pool started: handed the same pool
        let third = rt.new_task_manager("third");
        assert_eq!(
            rt.manager(third).unwrap().dispatcher().map(Dispatcher::threads),
            Some(3)
        );
    }

    #[test]
    fn test_set_dispatch_mode_unknown_manager() {
        let mut rt = runtime();
        let id = rt.new_task_manager("gone");
        rt.remove_manager(id).unwrap();
        assert_eq!(
            rt.set_dispatch_mode(id, DispatchMode::Parallel).unwrap_err(),
            SchedError::UnknownManager(id)
        );
        assert!(rt.dispatcher().is_none());
    }

    #[test]
    fn test_debug_report() {
        let mut rt = runtime();
        rt.global_instance().add_action("blink", |_| {}, false, false);
        rt.frame();

        let report = rt.debug_report();
        assert!(report.contains("Global Task Manager (1 active, 0 queued)"));
        assert!(report.contains("Task: blink - Complete: false"));

        let json: serde_json::Value = serde_json::from_str(&rt.report_json().unwrap()).unwrap();
        assert_eq!(json["frame"], 1);
        assert_eq!(json["managers"][0]["active"][0]["name"], "blink");
    }

    #[test]
    fn test_shutdown() {
        let mut rt = runtime();
        rt.global_instance().add_action("a", |_| {}, false, false);
        rt.new_task_manager("other");
        rt.shutdown();

        assert_eq!(rt.manager_count(), 0);
        assert_eq!(rt.global_id(), None);
        assert_eq!(rt.frame(), 0);
    }
}
