//! Fan-in of per-producer queues into one consumer
//!
//! [`DoubleBufferedQueueManager`] eliminates cross-producer contention by
//! giving every producer its own private [`DoubleBufferedQueue`] instead of
//! one shared buffer. Producers acquire a [`Producer`] handle via
//! [`get_producer`](DoubleBufferedQueueManager::get_producer) and only ever
//! touch their own queue; the consumer side fans all registered queues into
//! a single aggregated batch per drain pass.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐
//! │ Producer A │   │ Producer B │   │ Producer C │
//! └─────┬──────┘   └─────┬──────┘   └─────┬──────┘
//!       │ produce        │ produce        │ produce
//!       ▼                ▼                ▼
//! ┌───────────┐    ┌───────────┐    ┌───────────┐
//! │ private   │    │ private   │    │ private   │   (one double-buffered
//! │ queue A   │    │ queue B   │    │ queue C   │    queue per producer)
//! └─────┬─────┘    └─────┬─────┘    └─────┬─────┘
//!       └──────────┬─────┴────────────────┘
//!                  ▼  try_dequeue each, append
//!          ┌───────────────┐
//!          │ fan-in drain  │ ──► batch callback / dequeue() caller
//!          └───────────────┘
//! ```
//!
//! # Consumer modes
//!
//! With a batch callback installed (see
//! [`set_process_items`](DoubleBufferedQueueManager::set_process_items)),
//! every `produce` signals a collapsing scheduled drain that invokes the
//! callback with the aggregated batch. Without one, the manager is a passive
//! poll target: call [`dequeue`](DoubleBufferedQueueManager::dequeue)
//! yourself.
//!
//! Only one thread may drive the drain/poll path at a time; concurrent
//! consumers are not defended against.

use crate::double_buffered::{BatchHandler, DoubleBufferedQueue};
use crate::error::{panic_detail, FaultHandler, FaultHook, ProcessingFault, QueueError, QueueResult};
use crate::scheduler::{RuntimeScheduler, SynchronizedOperation, TaskScheduler};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Hands out per-producer queues and fans them into one consumer.
pub struct DoubleBufferedQueueManager<T> {
    /// Registry of live per-producer queues. Mutated on producer
    /// registration and release, iterated by the drain.
    queues: Mutex<Vec<Arc<DoubleBufferedQueue<T>>>>,
    process_items: RwLock<Option<BatchHandler<T>>>,
    drain_op: Arc<SynchronizedOperation>,
    /// Set when a drain pass could not empty every queue (a producer held
    /// its swap lock); guarantees a follow-up pass.
    items_left: AtomicBool,
    faults: FaultHook,
    scheduler: Arc<dyn TaskScheduler>,
}

impl<T: Send + 'static> DoubleBufferedQueueManager<T> {
    /// Create a manager dispatching drains onto the ambient tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime; use
    /// [`with_scheduler`](Self::with_scheduler) to inject one explicitly.
    pub fn new() -> Arc<Self> {
        Self::with_scheduler(Arc::new(RuntimeScheduler::current()))
    }

    pub fn with_scheduler(scheduler: Arc<dyn TaskScheduler>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let manager = weak.clone();
            let drain_op = SynchronizedOperation::new(Arc::clone(&scheduler), move || {
                if let Some(manager) = manager.upgrade() {
                    manager.handle_items();
                }
            });
            Self {
                queues: Mutex::new(Vec::new()),
                process_items: RwLock::new(None),
                drain_op,
                items_left: AtomicBool::new(false),
                faults: FaultHook::default(),
                scheduler,
            }
        })
    }

    /// Allocate a private queue, register it, and return the handle bound to
    /// it. Each handle is meant for exactly one logical producer.
    pub fn get_producer(self: &Arc<Self>) -> Producer<T> {
        let queue = DoubleBufferedQueue::with_scheduler(Arc::clone(&self.scheduler));
        self.queues.lock().push(Arc::clone(&queue));
        Producer {
            queue: Mutex::new(Some(queue)),
            manager: Arc::downgrade(self),
        }
    }
}

impl<T> DoubleBufferedQueueManager<T> {
    /// Install the consumer callback, then collect anything producers have
    /// already buffered. The last assignment wins.
    pub fn set_process_items(&self, handler: impl Fn(Vec<T>) + Send + Sync + 'static) {
        *self.process_items.write() = Some(Arc::new(handler));
        self.drain_op.run_once();
    }

    /// Install the handler invoked with processing faults. Without one,
    /// faults are logged and dropped.
    pub fn on_process_error(&self, handler: impl Fn(ProcessingFault) + Send + Sync + 'static) {
        self.faults.set(Arc::new(handler) as FaultHandler);
    }

    /// Number of live producer handles.
    pub fn producer_count(&self) -> usize {
        self.queues.lock().len()
    }

    /// Snapshot of items buffered across all producer queues.
    pub fn pending_len(&self) -> usize {
        self.queues.lock().iter().map(|queue| queue.len()).sum()
    }

    /// Whether the last drain pass left items behind in a contended queue.
    pub fn items_left(&self) -> bool {
        self.items_left.load(Ordering::SeqCst)
    }

    /// Drain every producer queue into one freshly allocated batch, in
    /// registry order (producer order carries no meaning). Part of the
    /// single-consumer path; do not call concurrently with the scheduled
    /// drain from another thread.
    pub fn dequeue(&self) -> Vec<T> {
        let mut contended = false;
        let mut aggregated = Vec::new();

        {
            let queues = self.queues.lock();
            for queue in queues.iter() {
                match queue.try_dequeue() {
                    Some(batch) => aggregated.extend(batch),
                    // Producer mid-enqueue; its items are picked up by the
                    // next pass.
                    None => contended = true,
                }
            }
        }

        self.items_left.store(contended, Ordering::SeqCst);
        aggregated
    }

    /// Request a scheduled drain. Concurrent signals collapse into at most
    /// one extra run. A no-op until a consumer callback is installed.
    pub(crate) fn signal_item_handler(&self) {
        if self.process_items.read().is_some() {
            self.drain_op.run_once();
        }
    }

    /// Scheduled drain body: aggregate, hand to the callback, and re-signal
    /// if a contended queue may still hold items.
    fn handle_items(&self) {
        let batch = self.dequeue();

        if !batch.is_empty() {
            let handler = self.process_items.read().clone();
            if let Some(handler) = handler {
                let count = batch.len();
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(batch))) {
                    self.faults.report(ProcessingFault::new(
                        format!("fan-in batch handler ({count} items)"),
                        panic_detail(payload),
                    ));
                }
            }
        }

        if self.items_left.load(Ordering::SeqCst) {
            self.drain_op.run_once();
        }
    }

    /// Deregister a released producer's queue: swap-with-last removal under
    /// the registry lock. Idempotent.
    fn release_queue(&self, queue: &Arc<DoubleBufferedQueue<T>>) {
        let mut queues = self.queues.lock();
        if let Some(index) = queues.iter().position(|q| Arc::ptr_eq(q, queue)) {
            queues.swap_remove(index);
        }
    }
}

/// Handle binding one producer to its private queue.
///
/// Dropping the handle releases it; [`release`](Self::release) does the same
/// eagerly and is idempotent. Once released, the producer's queue leaves the
/// registry and further [`produce`](Self::produce) calls are refused.
pub struct Producer<T> {
    queue: Mutex<Option<Arc<DoubleBufferedQueue<T>>>>,
    manager: Weak<DoubleBufferedQueueManager<T>>,
}

impl<T> Producer<T> {
    /// Append items to this producer's private queue and signal the manager
    /// that a drain is warranted.
    pub fn produce<I>(&self, items: I) -> QueueResult<()>
    where
        I: IntoIterator<Item = T>,
    {
        let guard = self.queue.lock();
        let queue = guard.as_ref().ok_or(QueueError::ProducerReleased)?;
        queue.enqueue(items);
        drop(guard);

        if let Some(manager) = self.manager.upgrade() {
            manager.signal_item_handler();
        }
        Ok(())
    }

    /// Detach from the private queue and remove it from the manager's
    /// registry. Safe to call more than once.
    pub fn release(&self) {
        let queue = self.queue.lock().take();
        if let Some(queue) = queue {
            if let Some(manager) = self.manager.upgrade() {
                manager.release_queue(&queue);
            }
        }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.release();
    }
}
