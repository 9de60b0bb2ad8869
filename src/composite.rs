//! Single-item-in, batch-out pipeline
//!
//! [`AsyncDoubleBufferedQueue`] chains an [`AsyncQueue`] of sequences into a
//! [`DoubleBufferedQueue`] of items: the enqueue call only pays for pushing
//! one sequence reference, while buffering and the user's batch callback run
//! in the deferred double-buffered stage.

use crate::async_queue::AsyncQueue;
use crate::double_buffered::DoubleBufferedQueue;
use crate::error::{FaultHandler, FaultHook, ProcessingFault, QueueResult};
use crate::scheduler::{RuntimeScheduler, TaskScheduler};
use std::sync::Arc;

/// Composite queue decoupling the enqueue hand-off from batching cost.
///
/// Faults from either stage surface through the composite's single fault
/// hook; see [`on_process_error`](Self::on_process_error).
pub struct AsyncDoubleBufferedQueue<T> {
    inbound: Arc<AsyncQueue<Vec<T>>>,
    batches: Arc<DoubleBufferedQueue<T>>,
    faults: FaultHook,
}

impl<T: Send + 'static> AsyncDoubleBufferedQueue<T> {
    /// Create a pipeline dispatching onto the ambient tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime; use
    /// [`with_scheduler`](Self::with_scheduler) to inject one explicitly.
    pub fn new() -> Arc<Self> {
        Self::with_scheduler(Arc::new(RuntimeScheduler::current()))
    }

    pub fn with_scheduler(scheduler: Arc<dyn TaskScheduler>) -> Arc<Self> {
        let batches = DoubleBufferedQueue::with_scheduler(Arc::clone(&scheduler));
        let inbound: Arc<AsyncQueue<Vec<T>>> = AsyncQueue::with_scheduler(scheduler);
        let faults = FaultHook::default();

        let hook = faults.clone();
        inbound.on_process_error(move |fault| hook.report(fault));
        let hook = faults.clone();
        batches.on_process_error(move |fault| hook.report(fault));

        let batch_stage = Arc::clone(&batches);
        inbound.set_process_item(move |sequence: Vec<T>| {
            batch_stage.enqueue(sequence);
        });

        Arc::new(Self {
            inbound,
            batches,
            faults,
        })
    }

    /// Hand a sequence of items to the pipeline. Cheap: the sequence is
    /// staged as one unit and buffered into batches off the caller's thread.
    pub fn enqueue<I>(&self, items: I) -> QueueResult<()>
    where
        I: IntoIterator<Item = T>,
    {
        self.inbound.enqueue(items.into_iter().collect())
    }

    /// Install the batch callback on the batching stage. The last assignment
    /// wins.
    pub fn set_process_items(&self, handler: impl Fn(Vec<T>) + Send + Sync + 'static) {
        self.batches.set_process_items(handler);
    }

    /// Install the handler invoked with faults from either stage.
    pub fn on_process_error(&self, handler: impl Fn(ProcessingFault) + Send + Sync + 'static) {
        self.faults.set(Arc::new(handler) as FaultHandler);
    }

    /// Pending work across both stages: buffered sequences not yet batched
    /// plus items awaiting the batch callback. An approximation, not a
    /// transactional total.
    pub fn len(&self) -> usize {
        self.inbound.len() + self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enabled(&self) -> bool {
        self.inbound.enabled()
    }

    /// Enable or disable the inbound stage; see
    /// [`AsyncQueue::set_enabled`].
    pub fn set_enabled(&self, enabled: bool) {
        self.inbound.set_enabled(enabled);
    }
}
