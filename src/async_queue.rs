//! Single-active-worker asynchronous processing queue
//!
//! [`AsyncQueue`] moves single items from any number of producer threads to a
//! processing callback that runs off the callers' threads, one item at a
//! time. The design goal is minimal producer-side contention:
//!
//! - the backing buffer is a lock-free unbounded queue, so `enqueue` never
//!   waits behind consumer processing time;
//! - at most one worker drains the queue at any moment, claimed by a
//!   compare-and-swap on the worker-active flag;
//! - the worker is a trampoline: each scheduled unit of work processes one
//!   item and then decides whether to resubmit itself for the next one,
//!   rather than looping while holding a worker thread hostage;
//! - the only lock is a short dispatch lock held for a single pop or a flag
//!   release, never across the processing callback.

use crate::error::{panic_detail, FaultHandler, FaultHook, ProcessingFault, QueueError, QueueResult};
use crate::scheduler::{RuntimeScheduler, TaskScheduler};
use crossbeam_queue::SegQueue;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked with each dequeued item, off the producer's thread.
pub type ItemHandler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Multi-producer queue that processes one item at a time in the background.
///
/// # Ordering
///
/// Items enqueued by one thread are processed in enqueue order. No relative
/// order is guaranteed between items from different threads.
///
/// # Example
///
/// ```rust,no_run
/// use relayq::AsyncQueue;
///
/// # #[tokio::main]
/// # async fn main() {
/// let queue = AsyncQueue::new();
/// queue.set_process_item(|value: u64| {
///     println!("processed {value}");
/// });
/// queue.enqueue(1).unwrap();
/// # }
/// ```
pub struct AsyncQueue<T> {
    buffer: SegQueue<T>,
    process_item: RwLock<Option<ItemHandler<T>>>,
    /// Guards the pop-or-release decision against racing enqueues. Never held
    /// across the processing callback.
    dispatch_lock: Mutex<()>,
    /// Worker-active flag: true while exactly one worker owns the drain.
    draining: AtomicBool,
    enabled: AtomicBool,
    faults: FaultHook,
    scheduler: Arc<dyn TaskScheduler>,
}

impl<T: Send + 'static> AsyncQueue<T> {
    /// Create a queue dispatching onto the ambient tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime; use
    /// [`with_scheduler`](Self::with_scheduler) to inject one explicitly.
    pub fn new() -> Arc<Self> {
        Self::with_scheduler(Arc::new(RuntimeScheduler::current()))
    }

    pub fn with_scheduler(scheduler: Arc<dyn TaskScheduler>) -> Arc<Self> {
        Arc::new(Self {
            buffer: SegQueue::new(),
            process_item: RwLock::new(None),
            dispatch_lock: Mutex::new(()),
            draining: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            faults: FaultHook::default(),
            scheduler,
        })
    }

    /// Install the processing callback. The last assignment wins; assign once
    /// before heavy use.
    pub fn set_process_item(&self, handler: impl Fn(T) + Send + Sync + 'static) {
        *self.process_item.write() = Some(Arc::new(handler));
    }

    /// Install the handler invoked with processing faults. Without one,
    /// faults are logged and dropped.
    pub fn on_process_error(&self, handler: impl Fn(ProcessingFault) + Send + Sync + 'static) {
        self.faults.set(Arc::new(handler) as FaultHandler);
    }

    /// Snapshot of the pending item count; not transactionally consistent
    /// with concurrent mutators.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable dispatch.
    ///
    /// Disabling halts dispatch of new workers; an in-flight worker finishes
    /// its current item first. Items enqueued while disabled accumulate.
    /// Enabling re-checks for pending items and restarts draining.
    pub fn set_enabled(self: &Arc<Self>, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if enabled && !self.buffer.is_empty() {
            self.try_dispatch();
        }
    }

    /// Push an item and, when enabled, start a worker if none is active.
    ///
    /// Never blocks behind the processing callback. Returns
    /// [`QueueError::NoProcessor`] if no processing callback has been
    /// assigned yet; that is a configuration error and the item is not
    /// accepted.
    pub fn enqueue(self: &Arc<Self>, item: T) -> QueueResult<()> {
        if self.process_item.read().is_none() {
            return Err(QueueError::NoProcessor);
        }

        self.buffer.push(item);

        if self.enabled.load(Ordering::SeqCst) {
            self.try_dispatch();
        }
        Ok(())
    }

    /// Claim the worker-active flag and submit the first item.
    ///
    /// The initial pop happens under the dispatch lock so it cannot race a
    /// concurrent claim-and-drain. Releasing the flag on an empty buffer also
    /// happens under the lock; afterwards the buffer is re-checked, because a
    /// push may have arrived (and lost its own claim) between the pop and the
    /// release. In that case the claim loop is re-entered so the item is
    /// never stranded.
    fn try_dispatch(self: &Arc<Self>) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            let claimed = {
                let _guard = self.dispatch_lock.lock();
                match self.buffer.pop() {
                    Some(item) => Some(item),
                    None => {
                        self.draining.store(false, Ordering::SeqCst);
                        None
                    }
                }
            };

            match claimed {
                Some(item) => {
                    self.submit(item);
                    return;
                }
                None => {
                    if self.buffer.is_empty() {
                        return;
                    }
                }
            }
        }
    }

    fn submit(self: &Arc<Self>, item: T) {
        let queue = Arc::clone(self);
        self.scheduler
            .schedule(Box::new(move || queue.run_worker(item)));
    }

    /// One trampoline step: process a single item, then either resubmit for
    /// the next item or release the worker-active flag.
    fn run_worker(self: Arc<Self>, item: T) {
        let handler = self.process_item.read().clone();
        if let Some(handler) = handler {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(item))) {
                self.faults.report(ProcessingFault::new(
                    "item handler",
                    panic_detail(payload),
                ));
            }
        }

        // Disable transition: re-check inside the lock so an enqueue racing
        // the transition either sees the flag still held or finds it released
        // and claims it itself.
        if !self.enabled.load(Ordering::SeqCst) {
            let _guard = self.dispatch_lock.lock();
            if !self.enabled.load(Ordering::SeqCst) {
                self.draining.store(false, Ordering::SeqCst);
                return;
            }
        }

        // Fast path: next item without the lock.
        if let Some(next) = self.buffer.pop() {
            self.submit(next);
            return;
        }

        let next = {
            let _guard = self.dispatch_lock.lock();
            match self.buffer.pop() {
                Some(next) => Some(next),
                None => {
                    self.draining.store(false, Ordering::SeqCst);
                    None
                }
            }
        };

        match next {
            Some(next) => self.submit(next),
            None => {
                if !self.buffer.is_empty() {
                    self.try_dispatch();
                }
            }
        }
    }
}
