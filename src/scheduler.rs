//! Task scheduling primitives
//!
//! The queues in this crate never spin up dedicated threads. Everything that
//! runs off the caller's thread is handed to a [`TaskScheduler`], whose only
//! contract is "run this unit of work once, on some worker, without blocking
//! the caller". The shipped implementation wraps a tokio runtime handle.
//!
//! [`SynchronizedOperation`] builds the second primitive the batch queues
//! need on top of that: an asynchronous run-once operation where any number
//! of concurrent requests collapse into at most one pending follow-up run.

use crate::error::panic_detail;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget dispatch onto some worker thread.
///
/// Implementations must not run the task inline on the calling thread and
/// must not block the caller; beyond that, scheduling order and worker
/// identity are unspecified.
pub trait TaskScheduler: Send + Sync + 'static {
    fn schedule(&self, task: Task);
}

/// [`TaskScheduler`] backed by a tokio runtime.
///
/// Tasks are dispatched through [`Handle::spawn_blocking`]: processing
/// callbacks are synchronous and may block, which would starve async worker
/// threads if scheduled with plain `spawn`.
pub struct RuntimeScheduler {
    handle: Handle,
}

impl RuntimeScheduler {
    /// Capture the runtime the calling context runs on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl TaskScheduler for RuntimeScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const PENDING: u8 = 2;

/// An asynchronous operation that runs at most once concurrently.
///
/// [`run_once`](Self::run_once) requests an execution of the action on the
/// scheduler. Requests made while an execution is already running or pending
/// collapse: however many arrive, exactly one follow-up execution happens
/// after the current one finishes. A request can never be lost (the action
/// always runs at least once after the latest request) and requests can never
/// queue without bound.
pub struct SynchronizedOperation {
    state: AtomicU8,
    action: Box<dyn Fn() + Send + Sync>,
    scheduler: Arc<dyn TaskScheduler>,
}

impl SynchronizedOperation {
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(IDLE),
            action: Box::new(action),
            scheduler,
        })
    }

    /// Request one asynchronous execution of the action.
    pub fn run_once(self: &Arc<Self>) {
        loop {
            match self
                .state
                .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    self.submit();
                    return;
                }
                Err(PENDING) => return,
                Err(_) => {
                    // Running: leave a pending marker. A failed exchange means
                    // the runner finished in the meantime, so claim again.
                    if self
                        .state
                        .compare_exchange(RUNNING, PENDING, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        return;
                    }
                }
            }
        }
    }

    fn submit(self: &Arc<Self>) {
        let operation = Arc::clone(self);
        self.scheduler
            .schedule(Box::new(move || operation.execute()));
    }

    fn execute(self: Arc<Self>) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (self.action)())) {
            log::error!(
                "scheduled operation panicked: {}",
                panic_detail(payload)
            );
        }

        loop {
            if self
                .state
                .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.submit();
                return;
            }
            if self
                .state
                .compare_exchange(RUNNING, IDLE, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }
}
