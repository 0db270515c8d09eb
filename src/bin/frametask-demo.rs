//! frametask demo - runs a few scheduling scenarios on a simulated frame loop
//!
//! Usage: frametask-demo [basic|sequential|parallel|physics|all] [--config path.json]

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    native::main();
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use frametask::platform::native::FrameLoop;
    use frametask::{
        Clock, DispatchMode, ManagerConfig, Priority, Runtime, RuntimeConfig, SchedResult, Task,
    };
    use std::time::Duration;

    pub fn main() {
        if let Err(e) = run() {
            eprintln!("frametask-demo: {}", e);
            std::process::exit(1);
        }
    }

    fn run() -> SchedResult<()> {
        let mut args = std::env::args().skip(1);
        let mut scenario = "all".to_string();
        let mut config = RuntimeConfig::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let Some(path) = args.next() else {
                        eprintln!("--config needs a path");
                        return Ok(());
                    };
                    let json = std::fs::read_to_string(&path).map_err(|e| {
                        frametask::SchedError::InvalidConfig(format!("{}: {}", path, e))
                    })?;
                    config = RuntimeConfig::from_json(&json)?;
                }
                "help" | "--help" | "-h" => {
                    print_help();
                    return Ok(());
                }
                other => scenario = other.to_string(),
            }
        }

        match scenario.as_str() {
            "basic" => basic(&config),
            "sequential" => sequential(&config),
            "parallel" => parallel(&config),
            "physics" => physics(&config),
            "all" => {
                basic(&config)?;
                sequential(&config)?;
                parallel(&config)?;
                physics(&config)
            }
            other => {
                eprintln!("unknown scenario: {}", other);
                print_help();
                Ok(())
            }
        }
    }

    fn print_help() {
        println!("frametask-demo - Available scenarios:");
        println!("  basic       - one-frame, multi-frame and timed tasks side by side");
        println!("  sequential  - tasks that wait for each other");
        println!("  parallel    - actions fanned out to the worker pool");
        println!("  physics     - physics-synced tasks under a faster render rate");
        println!("  all         - everything above (default)");
        println!();
        println!("Options:");
        println!("  --config <path>  Load a RuntimeConfig from JSON");
    }

    fn new_runtime(config: &RuntimeConfig) -> SchedResult<Runtime> {
        Runtime::with_clock(Clock::manual(0), config.clone())
    }

    fn finish(title: &str, rt: &mut Runtime) {
        let mut frame_loop = FrameLoop::new(rt.config()).simulated();
        let stats = frame_loop.run_while(rt, |rt| rt.managers().any(|(_, m)| m.has_tasks()));
        println!(
            "{}: {} frames, {} physics steps, {} actions",
            title, stats.frames, stats.physics_steps, stats.invoked
        );
        println!();
    }

    fn basic(config: &RuntimeConfig) -> SchedResult<()> {
        println!("== basic ==");
        let mut rt = new_runtime(config)?;
        let clock = rt.clock().clone();
        let global = rt.global_instance();

        global.do_next_frame(
            |task| println!("  [{}] next frame", task.context().clock().frame()),
            false,
        );
        global.do_for_frames(
            |task| {
                println!(
                    "  [{}] three frames, {} elapsed",
                    task.context().clock().frame(),
                    task.context().frames_elapsed()
                )
            },
            3,
            false,
        );
        global.add_task(
            Task::builder(&clock, "fade", |task| {
                println!(
                    "  [{}] fade at {}ms",
                    task.context().clock().frame(),
                    task.context().time_elapsed().as_millis()
                )
            })
            .seconds(Duration::from_millis(50))
            .must_finish(true)
            .build()?,
            false,
        );

        finish("basic", &mut rt);
        Ok(())
    }

    fn sequential(config: &RuntimeConfig) -> SchedResult<()> {
        println!("== sequential ==");
        let mut rt = new_runtime(config)?;
        let id = rt.new_task_manager_with(ManagerConfig::new("Cutscene").sequential(true))?;
        let clock = rt.clock().clone();

        if let Some(cutscene) = rt.manager_mut(id) {
            for (step, frames) in [("pan", 2), ("zoom", 3), ("fade out", 1)] {
                cutscene.add_task(
                    Task::builder(&clock, step, |task| {
                        println!("  [{}] {}", task.context().clock().frame(), task.name())
                    })
                    .frames(frames)
                    .build()?,
                    false,
                );
            }
            // Promoted ahead of the steps queued before it
            cutscene.add_task(
                Task::builder(&clock, "skip prompt", |task| {
                    println!("  [{}] {}", task.context().clock().frame(), task.name());
                    task.mark_complete();
                })
                .priority(Priority::Critical)
                .build()?,
                false,
            );
        }

        finish("sequential", &mut rt);
        Ok(())
    }

    fn parallel(config: &RuntimeConfig) -> SchedResult<()> {
        println!("== parallel ==");
        let mut rt = new_runtime(config)?;
        let id = rt.new_task_manager_with(
            ManagerConfig::new("Pathfinding").dispatch(DispatchMode::Parallel),
        )?;
        let clock = rt.clock().clone();

        if let Some(manager) = rt.manager_mut(id) {
            for agent in 0..4 {
                manager.add_task(
                    Task::builder(&clock, format!("agent {}", agent), |task| {
                        let thread = std::thread::current();
                        println!(
                            "  [{}] {} on {}",
                            task.context().clock().frame(),
                            task.name(),
                            thread.name().unwrap_or("?")
                        );
                    })
                    .frames(2)
                    .build()?,
                    false,
                );
            }
        }

        finish("parallel", &mut rt);
        Ok(())
    }

    fn physics(config: &RuntimeConfig) -> SchedResult<()> {
        println!("== physics ==");
        let mut rt = new_runtime(config)?;
        let clock = rt.clock().clone();
        rt.global_instance().add_task(
            Task::builder(&clock, "rigidbody", |task| {
                println!(
                    "  [{}] physics step {}",
                    task.context().clock().frame(),
                    task.context().physics_frames_elapsed()
                )
            })
            .with_physics(true)
            .frames(12)
            .build()?,
            false,
        );

        finish("physics", &mut rt);
        if config.verbose {
            print!("{}", rt.debug_report());
        }
        Ok(())
    }
}
