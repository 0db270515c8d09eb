//! frametask - cooperative frame-driven task scheduling
//!
//! Host code builds [`Task`]s from closures and submits them to a
//! [`TaskManager`]. The host then drives two hooks:
//! - once per rendered frame: [`Runtime::frame`] (or [`TaskManager::tick`])
//! - once per fixed physics step: [`Runtime::physics_step`]
//!
//! Tasks never run on the frame they were submitted, can be bounded by a
//! frame count or a wall-clock duration, and can be throttled to one run per
//! physics step. Time comes from a [`Clock`] that ignores any pause or time
//! scale the host applies to its own simulation.
//!
//! Platform support:
//! - Native: [`platform::native::FrameLoop`] drives render and physics ticks
//! - Browser (wasm32-unknown-unknown): `platform::web::start` uses
//!   requestAnimationFrame

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod config;
pub mod platform;
pub mod runtime;
pub mod scheduler;

pub use config::{ManagerConfig, RuntimeConfig};
pub use runtime::{ManagerId, Runtime};
pub use scheduler::{
    Clock, DispatchMode, Priority, SchedError, SchedResult, Task, TaskBuilder, TaskContext,
    TaskId, TaskKey, TaskManager,
};

/// Initialize panic hook for better error messages in browser console
#[cfg(target_arch = "wasm32")]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Console logging helper
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

/// Log to browser console (WASM)
#[cfg(target_arch = "wasm32")]
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => {
        $crate::log(&format!($($t)*))
    };
}

/// Log to stderr (native)
#[cfg(not(target_arch = "wasm32"))]
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => {
        eprintln!($($t)*)
    };
}
