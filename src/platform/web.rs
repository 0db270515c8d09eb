//! Browser frame driver
//!
//! requestAnimationFrame drives [`Runtime::frame`]; elapsed time between
//! animation frames is turned into physics steps with [`FixedStep`]. The
//! runtime lives in a thread local for the lifetime of the page, so host
//! code reaches it through [`with_runtime`].

use super::FixedStep;
use crate::console_log;
use crate::runtime::Runtime;
use std::cell::RefCell;
use std::time::Duration;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// State for the animation frame loop
struct DriverState {
    runtime: Option<Runtime>,
    /// Callback for requestAnimationFrame (stored to prevent GC)
    frame_closure: Option<Closure<dyn FnMut(f64)>>,
    running: bool,
    physics: Option<FixedStep>,
    /// Timestamp of the previous animation frame, in milliseconds
    last_timestamp: Option<f64>,
    frame_count: u64,
}

thread_local! {
    static STATE: RefCell<DriverState> = const {
        RefCell::new(DriverState {
            runtime: None,
            frame_closure: None,
            running: false,
            physics: None,
            last_timestamp: None,
            frame_count: 0,
        })
    };
}

/// Take ownership of `runtime` and start ticking it every animation frame
pub fn start(runtime: Runtime) {
    crate::init_panic_hook();

    let already_running = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.running {
            return true;
        }
        state.physics = Some(FixedStep::new(runtime.config().physics_interval()));
        state.last_timestamp = now_ms();
        state.runtime = Some(runtime);
        state.running = true;
        false
    });

    if already_running {
        console_log!("[runtime] Already running");
        return;
    }

    console_log!("[runtime] Starting frame loop...");
    request_animation_frame();
}

/// Stop ticking. The runtime stays installed and can be inspected.
pub fn stop() {
    STATE.with(|state| {
        state.borrow_mut().running = false;
    });
    console_log!("[runtime] Stopped");
}

/// Stop ticking and hand the runtime back
pub fn take_runtime() -> Option<Runtime> {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.running = false;
        state.runtime.take()
    })
}

/// Run `f` against the installed runtime
///
/// Must not be called from inside a task action: the runtime is borrowed
/// for the whole frame.
pub fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
    STATE.with(|state| state.borrow_mut().runtime.as_mut().map(f))
}

/// Get current frame count
pub fn frame_count() -> u64 {
    STATE.with(|state| state.borrow().frame_count)
}

/// Text debug report of the installed runtime
#[wasm_bindgen]
pub fn frametask_debug_report() -> String {
    with_runtime(|rt| rt.debug_report()).unwrap_or_default()
}

fn now_ms() -> Option<f64> {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
}

/// Request the next animation frame
fn request_animation_frame() {
    let window = match web_sys::window() {
        Some(w) => w,
        None => {
            web_sys::console::warn_1(&"[runtime] No window object".into());
            return;
        }
    };

    let closure = Closure::wrap(Box::new(move |timestamp: f64| {
        frame_tick(timestamp);
    }) as Box<dyn FnMut(f64)>);

    STATE.with(|state| {
        let mut state = state.borrow_mut();
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        state.frame_closure = Some(closure);
    });
}

/// Called every frame by requestAnimationFrame
fn frame_tick(timestamp: f64) {
    let should_continue = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.running {
            return false;
        }

        let elapsed_ms = state
            .last_timestamp
            .map(|last| (timestamp - last).max(0.0))
            .unwrap_or(0.0);
        state.last_timestamp = Some(timestamp);
        state.frame_count += 1;

        let steps = state
            .physics
            .as_mut()
            .map(|physics| physics.accumulate(Duration::from_secs_f64(elapsed_ms / 1000.0)))
            .unwrap_or(0);

        if let Some(runtime) = state.runtime.as_mut() {
            for _ in 0..steps {
                runtime.physics_step();
            }
            runtime.frame();
        }
        true
    });

    if should_continue {
        request_animation_frame();
    }
}
