//! Integration tests for frametask
//!
//! Drives the public API end to end: a runtime on a manual clock, its
//! managers, and the native frame loop.

use frametask::platform::native::FrameLoop;
use frametask::scheduler::TraceKind;
use frametask::{
    Clock, DispatchMode, ManagerConfig, Priority, Runtime, RuntimeConfig, Task, TaskKey,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Runtime on a manual clock starting at t=0, frame 0
fn init_test() -> Runtime {
    Runtime::with_clock(Clock::manual(0), RuntimeConfig::default()).unwrap()
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn counting(count: &Arc<AtomicUsize>) -> impl Fn(&mut Task) + Send + Sync + 'static {
    let count = count.clone();
    move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Lifecycle scenarios
// ============================================================================

#[test]
fn test_concurrent_durations() {
    let mut rt = init_test();
    let x = counter();
    let y = counter();
    let x_id = rt.global_instance().do_for_frames(counting(&x), 3, false);
    let y_id = rt.global_instance().do_for_frames(counting(&y), 5, false);

    rt.frame();
    assert_eq!(rt.global_instance().active_len(), 2);

    let mut x_gone = None;
    let mut y_gone = None;
    for frame in 2..=8 {
        rt.frame();
        let global = rt.global_instance();
        if x_gone.is_none() && global.get(x_id).is_none() {
            x_gone = Some(frame);
        }
        if y_gone.is_none() && global.get(y_id).is_none() {
            y_gone = Some(frame);
        }
    }

    assert_eq!(x.load(Ordering::SeqCst), 3);
    assert_eq!(y.load(Ordering::SeqCst), 5);
    assert_eq!(x_gone, Some(4));
    assert_eq!(y_gone, Some(6));
}

#[test]
fn test_sequential_handoff() {
    let mut rt = init_test();
    let id = rt
        .new_task_manager_with(ManagerConfig::new("Cutscene").sequential(true))
        .unwrap();
    let clock = rt.clock().clone();
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["x", "y"] {
        let log = log.clone();
        let task = Task::builder(&clock, name, move |task| {
            let frame = task.context().clock().frame();
            log.lock().unwrap().push((task.name().to_string(), frame));
        })
        .frames(2)
        .build()
        .unwrap();
        rt.manager_mut(id).unwrap().add_task(task, false);
    }

    for _ in 0..7 {
        rt.frame();
        assert!(rt.manager(id).unwrap().active_len() <= 1);
    }

    let log = log.lock().unwrap();
    let expected: Vec<(String, u64)> = [("x", 1), ("x", 2), ("y", 4), ("y", 5)]
        .into_iter()
        .map(|(name, frame)| (name.to_string(), frame))
        .collect();
    assert_eq!(*log, expected);
}

#[test]
fn test_do_next_frame() {
    let mut rt = init_test();
    let count = counter();
    rt.global_instance().do_next_frame(counting(&count), false);

    // Same frame: nothing runs
    assert_eq!(rt.global_instance().tick(), 0);

    assert_eq!(rt.frame(), 1);
    assert_eq!(rt.frame(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!rt.global_instance().has_tasks());
}

#[test]
fn test_physics_sync() {
    let mut rt = init_test();
    let count = counter();
    rt.global_instance()
        .add_action("rigidbody", counting(&count), true, false);

    for _ in 0..5 {
        rt.physics_step();
        rt.frame();
        rt.frame();
        rt.frame();
    }
    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn test_physics_sync_under_frame_loop() {
    let config = RuntimeConfig::default().target_fps(100).physics_hz(25);
    let mut rt = Runtime::with_clock(Clock::manual(0), config).unwrap();
    let count = counter();
    rt.global_instance()
        .add_action("rigidbody", counting(&count), true, false);

    let stats = FrameLoop::new(rt.config()).simulated().run_for(&mut rt, 40);

    assert_eq!(stats.physics_steps, 10);
    assert_eq!(count.load(Ordering::SeqCst), 10);
}

// ============================================================================
// Task behavior
// ============================================================================

#[test]
fn test_action_reads_its_own_context() {
    let mut rt = init_test();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    rt.global_instance().do_for_frames(
        move |task| log.lock().unwrap().push(task.context().frames_elapsed()),
        3,
        false,
    );

    for _ in 0..5 {
        rt.frame();
    }
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_timed_must_finish() {
    let mut rt = init_test();
    let clock = rt.clock().clone();
    let count = counter();
    let runs = count.clone();
    let task = Task::builder(&clock, "fade", move |task| {
        runs.fetch_add(1, Ordering::SeqCst);
        task.mark_complete();
    })
    .seconds(Duration::from_millis(30))
    .must_finish(true)
    .build()
    .unwrap();
    rt.global_instance().add_task(task, false);

    for _ in 0..3 {
        rt.frame();
        clock.advance(Duration::from_millis(10));
    }
    assert_eq!(rt.global_instance().active_len(), 1);

    rt.frame();
    assert!(!rt.global_instance().has_tasks());
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn test_clone_can_be_resubmitted() {
    let mut rt = init_test();
    let count = counter();
    let clock = rt.clock().clone();
    let task = Task::builder(&clock, "spark", counting(&count))
        .key("spark")
        .frames(1)
        .build()
        .unwrap();
    let copy = task.clone();

    let global = rt.global_instance();
    assert!(global.add_task(task, false).is_some());
    assert!(global.add_task(copy.clone(), false).is_none());
    let second = global.add_task(copy, true);
    assert!(second.is_some());
    assert!(global.contains_key(&TaskKey::from("spark")));

    rt.frame();
    rt.frame();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(!rt.global_instance().contains_key(&TaskKey::from("spark")));
}

#[test]
fn test_task_built_earlier_waits_for_next_frame() {
    let mut rt = init_test();
    let count = counter();
    let clock = rt.clock().clone();
    let task = Task::new(&clock, "prebuilt", counting(&count));

    rt.frame();
    rt.frame();
    rt.global_instance().add_task(task.clone(), false);
    // Same frame as the submission: nothing runs
    assert_eq!(rt.global_instance().tick(), 0);
    assert_eq!(rt.frame(), 1);

    rt.global_instance().add_task(task, false);
    assert_eq!(rt.global_instance().tick(), 1);
    assert_eq!(rt.frame(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[test]
fn test_priority_across_promotion() {
    let mut rt = init_test();
    let clock = rt.clock().clone();
    let order = Arc::new(Mutex::new(Vec::new()));

    for (name, priority) in [
        ("ambient", Priority::Background),
        ("input", Priority::Critical),
        ("ui", Priority::Normal),
    ] {
        let order = order.clone();
        let task = Task::builder(&clock, name, move |task| {
            order.lock().unwrap().push(task.name().to_string());
            task.mark_complete();
        })
        .priority(priority)
        .build()
        .unwrap();
        rt.global_instance().add_task(task, false);
    }

    rt.frame();
    assert_eq!(*order.lock().unwrap(), vec!["input", "ui", "ambient"]);
}

// ============================================================================
// Failure and cancellation
// ============================================================================

#[test]
fn test_panic_propagates_out_of_frame() {
    let mut rt = init_test();
    let later = counter();
    let first = rt.new_task_manager("first");
    let second = rt.new_task_manager("second");
    rt.manager_mut(first)
        .unwrap()
        .add_action("boom", |_| panic!("broken task"), false, false);
    rt.manager_mut(second)
        .unwrap()
        .add_action("later", counting(&later), false, false);

    let result = catch_unwind(AssertUnwindSafe(|| rt.frame()));

    assert!(result.is_err());
    assert_eq!(later.load(Ordering::SeqCst), 0);
    assert_eq!(rt.manager(first).unwrap().active_len(), 1);
    assert_eq!(rt.manager(second).unwrap().queued_len(), 1);
}

#[test]
fn test_cancel_frees_key() {
    let mut rt = init_test();
    let count = counter();
    let global = rt.global_instance();
    let id = global
        .add_action("blink", counting(&count), false, false)
        .unwrap();
    assert!(global.add_action("blink", |_| {}, false, false).is_none());

    rt.frame();
    assert!(rt.global_instance().cancel(id));
    rt.frame();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(
        rt.global_instance()
            .add_action("blink", |_| {}, false, false)
            .is_some()
    );
}

// ============================================================================
// Dispatch modes
// ============================================================================

#[test]
fn test_background_modes_match_inline_results() {
    for mode in [
        DispatchMode::Inline,
        DispatchMode::Offloaded,
        DispatchMode::Parallel,
    ] {
        let mut rt = Runtime::with_clock(
            Clock::manual(0),
            RuntimeConfig::default().worker_threads(2),
        )
        .unwrap();
        let id = rt
            .new_task_manager_with(ManagerConfig::new("work").dispatch(mode))
            .unwrap();
        let count = counter();
        let clock = rt.clock().clone();
        for i in 0..4 {
            let task = Task::builder(&clock, format!("job {}", i), counting(&count))
                .frames(3)
                .build()
                .unwrap();
            rt.manager_mut(id).unwrap().add_task(task, false);
        }

        let mut invoked = 0;
        for _ in 0..5 {
            invoked += rt.frame();
        }

        assert_eq!(invoked, 12, "{:?}", mode);
        assert_eq!(count.load(Ordering::SeqCst), 12, "{:?}", mode);
        assert!(!rt.manager(id).unwrap().has_tasks(), "{:?}", mode);
    }
}

// ============================================================================
// Config and reporting
// ============================================================================

#[test]
fn test_runtime_from_json_config() {
    let config = RuntimeConfig::from_json(r#"{ "trace_enabled": true, "trace_capacity": 4 }"#)
        .unwrap();
    let mut rt = Runtime::with_clock(Clock::manual(0), config).unwrap();
    let global = rt.global_instance();
    for _ in 0..3 {
        global.do_next_frame(|_| {}, false);
    }

    assert!(global.trace().is_enabled());
    assert_eq!(global.trace().events().len(), 3);

    rt.frame();
    let trace = rt.global_instance().trace();
    assert_eq!(trace.events().len(), 4);
    assert_eq!(trace.stats().invocations, 3);
}

#[test]
fn test_trace_toggled_at_runtime() {
    let mut rt = init_test();
    let global = rt.global_instance();
    global.do_next_frame(|_| {}, false);
    assert!(global.trace().events().is_empty());

    global.trace_mut().enable();
    rt.frame();
    rt.frame();

    let trace = rt.global_instance().trace();
    assert_eq!(trace.events_of(TraceKind::Invoked).len(), 1);
    assert_eq!(trace.events_of(TraceKind::Submitted).len(), 0);
    assert_eq!(trace.stats().submitted, 1);

    rt.global_instance().trace_mut().disable();
    rt.global_instance().do_next_frame(|_| {}, false);
    rt.frame();
    assert_eq!(rt.global_instance().trace().events_of(TraceKind::Invoked).len(), 1);
}

#[test]
fn test_report_json() {
    let mut rt = init_test();
    rt.global_named("Destructibles")
        .add_action("crumble", |_| {}, false, false);
    rt.frame();
    rt.clock().advance(Duration::from_millis(250));
    rt.frame();

    let json: serde_json::Value = serde_json::from_str(&rt.report_json().unwrap()).unwrap();
    assert_eq!(json["frame"], 2);
    let manager = &json["managers"][0];
    assert_eq!(manager["name"], "Destructibles");
    assert_eq!(manager["global"], true);
    assert_eq!(manager["active"][0]["frames_elapsed"], 1);
    assert_eq!(manager["active"][0]["time_elapsed_secs"], 0.25);
}
