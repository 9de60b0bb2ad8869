//! Double-buffered batch queue
//!
//! [`DoubleBufferedQueue`] accumulates items for one producer into an active
//! buffer while a consumer drains the standby buffer. A dequeue is an O(1)
//! index swap plus moving one `Vec` out, so the writer-blocking critical
//! section is bounded by the batch being handed over, never by backlog size
//! and never by consumer processing time.
//!
//! The queue can be drained two ways: by polling [`dequeue`] /
//! [`try_dequeue`] directly (the manager does this for its per-producer
//! queues), or by installing a batch callback with [`set_process_items`],
//! which schedules a collapsing background drain after every enqueue.
//!
//! [`dequeue`]: DoubleBufferedQueue::dequeue
//! [`try_dequeue`]: DoubleBufferedQueue::try_dequeue
//! [`set_process_items`]: DoubleBufferedQueue::set_process_items

use crate::error::{panic_detail, FaultHandler, FaultHook, ProcessingFault};
use crate::scheduler::{RuntimeScheduler, SynchronizedOperation, TaskScheduler};
use parking_lot::{Mutex, RwLock};
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with each drained batch, in enqueue order.
pub type BatchHandler<T> = Arc<dyn Fn(Vec<T>) + Send + Sync>;

struct BufferPair<T> {
    buffers: [Vec<T>; 2],
    active: usize,
}

impl<T> BufferPair<T> {
    fn new() -> Self {
        Self {
            buffers: [Vec::new(), Vec::new()],
            active: 0,
        }
    }
}

/// Two-buffer batch accumulator for a single producer.
///
/// Writers only ever touch the active buffer; a dequeue swaps the active
/// index and hands the previous active buffer's contents to the caller as an
/// owned `Vec`. One short mutex guards the pair; it is held for an append or
/// a swap, never across the batch callback.
pub struct DoubleBufferedQueue<T> {
    inner: Mutex<BufferPair<T>>,
    /// Last size written under the lock; lets callers that failed a
    /// non-blocking swap decide whether a retry is worthwhile.
    len: AtomicUsize,
    process_items: RwLock<Option<BatchHandler<T>>>,
    drain: Arc<SynchronizedOperation>,
    faults: FaultHook,
}

impl<T: Send + 'static> DoubleBufferedQueue<T> {
    /// Create a queue dispatching drains onto the ambient tokio runtime.
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
            let queue = weak.clone();
            let drain = SynchronizedOperation::new(scheduler, move || {
                if let Some(queue) = queue.upgrade() {
                    queue.drain_once();
                }
            });
            Self {
                inner: Mutex::new(BufferPair::new()),
                len: AtomicUsize::new(0),
                process_items: RwLock::new(None),
                drain,
                faults: FaultHook::default(),
            }
        })
    }
}

impl<T> DoubleBufferedQueue<T> {
    /// Install the batch callback and schedule a drain for anything already
    /// pending. The last assignment wins.
    pub fn set_process_items(&self, handler: impl Fn(Vec<T>) + Send + Sync + 'static) {
        *self.process_items.write() = Some(Arc::new(handler));
        if self.len.load(Ordering::SeqCst) > 0 {
            self.drain.run_once();
        }
    }

    /// Install the handler invoked with processing faults. Without one,
    /// faults are logged and dropped.
    pub fn on_process_error(&self, handler: impl Fn(ProcessingFault) + Send + Sync + 'static) {
        self.faults.set(Arc::new(handler) as FaultHandler);
    }

    /// Last size snapshot taken under the swap lock.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append items to the active buffer, then request a background drain if
    /// a batch callback is installed.
    ///
    /// The items are staged into a `Vec` before the lock is taken, so the
    /// critical section is a bounded O(k) append regardless of how expensive
    /// the caller's iterator is.
    pub fn enqueue<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut staged: Vec<T> = items.into_iter().collect();
        if staged.is_empty() {
            return;
        }

        {
            let mut inner = self.inner.lock();
            let active = inner.active;
            inner.buffers[active].append(&mut staged);
            self.len
                .store(inner.buffers[active].len(), Ordering::SeqCst);
        }

        if self.process_items.read().is_some() {
            self.drain.run_once();
        }
    }

    /// Non-blocking [`enqueue`](Self::enqueue): if the swap lock is held, the
    /// items are handed back untouched and the caller decides whether to
    /// retry or drop them.
    pub fn try_enqueue(&self, mut items: Vec<T>) -> Result<(), Vec<T>> {
        if items.is_empty() {
            return Ok(());
        }

        match self.inner.try_lock() {
            Some(mut inner) => {
                let active = inner.active;
                inner.buffers[active].append(&mut items);
                self.len
                    .store(inner.buffers[active].len(), Ordering::SeqCst);
                drop(inner);

                if self.process_items.read().is_some() {
                    self.drain.run_once();
                }
                Ok(())
            }
            None => Err(items),
        }
    }

    /// Swap buffers and return everything enqueued since the previous drain,
    /// in enqueue order. The returned `Vec` is owned by the caller.
    pub fn dequeue(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        let drained = inner.active;
        inner.active ^= 1;
        let batch = mem::take(&mut inner.buffers[drained]);
        self.len.store(0, Ordering::SeqCst);
        batch
    }

    /// Non-blocking [`dequeue`](Self::dequeue). `None` means the swap lock
    /// was unavailable (the producer is mid-enqueue); [`len`](Self::len)
    /// still reports the last known size so the caller can decide whether to
    /// come back.
    pub fn try_dequeue(&self) -> Option<Vec<T>> {
        let mut inner = self.inner.try_lock()?;
        let drained = inner.active;
        inner.active ^= 1;
        let batch = mem::take(&mut inner.buffers[drained]);
        self.len.store(0, Ordering::SeqCst);
        Some(batch)
    }

    /// One scheduled drain: swap, then hand the batch to the callback. A
    /// panicking callback is reported through the fault hook and neither
    /// corrupts the buffer pair nor prevents future drains.
    fn drain_once(&self) {
        let handler = self.process_items.read().clone();
        let Some(handler) = handler else {
            return;
        };

        let batch = self.dequeue();
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(batch))) {
            self.faults.report(ProcessingFault::new(
                format!("batch handler ({count} items)"),
                panic_detail(payload),
            ));
        }
    }
}
