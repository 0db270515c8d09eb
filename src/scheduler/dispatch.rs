//! Background dispatch
//!
//! Managers in a background mode hand tasks to a [`Dispatcher`] by value and
//! block until they come back, so the manager's containers are only ever
//! touched by the thread calling `tick`.
//!
//! A panicking action is caught on the worker so the task itself can be
//! returned; the manager re-raises the panic on the ticking thread.

use super::error::{SchedError, SchedResult};
use super::task::Task;
use futures::channel::oneshot;
use futures::executor::{ThreadPool, block_on};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// How a manager runs the actions of its active tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// On the thread calling `tick`
    #[default]
    Inline,
    /// One at a time on the pool, each awaited before the next starts. List
    /// order is kept, a slow action delays every task behind it.
    Offloaded,
    /// Every eligible action of a tick at once, joined before retirement
    Parallel,
}

impl DispatchMode {
    pub fn needs_pool(self) -> bool {
        !matches!(self, DispatchMode::Inline)
    }
}

/// Panic payload carried back from a worker
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// A task handed back by a worker
pub(crate) struct Returned {
    pub task: Task,
    pub panic: Option<PanicPayload>,
}

/// Thread pool shared by the managers of a runtime
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pool: ThreadPool,
    threads: usize,
}

impl Dispatcher {
    /// Start a pool with `threads` workers (at least one)
    pub fn new(threads: usize) -> SchedResult<Self> {
        if cfg!(target_arch = "wasm32") {
            return Err(SchedError::DispatcherUnavailable(
                "no worker threads on this platform".into(),
            ));
        }
        let threads = threads.max(1);
        let pool = ThreadPool::builder()
            .pool_size(threads)
            .name_prefix("frametask-worker-")
            .create()
            .map_err(|e| SchedError::DispatcherUnavailable(e.to_string()))?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn submit(&self, task: Task) -> oneshot::Receiver<Returned> {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn_ok(async move {
            let mut task = task;
            let panic = catch_unwind(AssertUnwindSafe(|| task.invoke())).err();
            // The receiver is gone only if the ticking thread is unwinding
            let _ = tx.send(Returned { task, panic });
        });
        rx
    }

    /// Run one action on the pool and wait for it. `None` means the worker
    /// dropped the task without answering.
    pub(crate) fn run_one(&self, task: Task) -> Option<Returned> {
        block_on(self.submit(task)).ok()
    }

    /// Run every action concurrently and wait for all of them. Results come
    /// back in input order.
    pub(crate) fn run_all(&self, tasks: Vec<Task>) -> Vec<Option<Returned>> {
        let receivers: Vec<_> = tasks.into_iter().map(|task| self.submit(task)).collect();
        block_on(join_all(receivers))
            .into_iter()
            .map(Result::ok)
            .collect()
    }
}

/// Best-effort message from a panic payload
pub fn panic_message(payload: &PanicPayload) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
