//! Low-Contention Relay Queues
//!
//! A family of queues for moving items from many producer threads to a
//! single consumer with minimal lock contention and bounded, self-scheduling
//! background processing. The shared discipline across all components:
//!
//! - **Short critical sections**: locks are held for an append, an index
//!   swap, or a flag transition — never across a user callback. Producers
//!   block behind bounded O(1)–O(k) work, never behind consumer processing
//!   time.
//! - **Single-active-worker dispatch**: a compare-and-swap guarded flag
//!   guarantees at most one worker drains a queue at a time, and workers are
//!   trampolines that resubmit themselves to the scheduler per unit of work.
//! - **Double buffering**: writers and readers operate on disjoint buffers,
//!   swapped in O(1) under the shortest possible lock.
//! - **Fan-in**: one private buffer per producer, aggregated into a single
//!   consumer-visible batch per drain pass.
//!
//! # Components
//!
//! ```text
//! ┌──────────────────────┐  one item at a time, CAS-claimed worker
//! │      AsyncQueue      │  trampolining through the scheduler
//! └──────────────────────┘
//! ┌──────────────────────┐  active/standby buffer pair, O(1) swap,
//! │  DoubleBufferedQueue │  batch callback or direct polling
//! └──────────────────────┘
//! ┌──────────────────────┐  per-producer private queues fanned into
//! │ DoubleBufferedQueue- │  one consumer via a collapsing scheduled
//! │       Manager        │  drain
//! └──────────────────────┘
//! ┌──────────────────────┐  AsyncQueue<Vec<T>> feeding a
//! │ AsyncDoubleBuffered- │  DoubleBufferedQueue<T>: cheap hand-off,
//! │        Queue         │  deferred batching
//! └──────────────────────┘
//! ```
//!
//! # Ordering and delivery
//!
//! Enqueue order is preserved per producer through to the processing
//! callback. No relative order exists across producers, no fairness policy,
//! no bounded capacity, and no cancellation of an in-flight callback.
//!
//! # Example
//!
//! ```rust,no_run
//! use relayq::DoubleBufferedQueueManager;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = DoubleBufferedQueueManager::new();
//! manager.set_process_items(|batch: Vec<u64>| {
//!     println!("drained {} items", batch.len());
//! });
//!
//! let producer = manager.get_producer();
//! producer.produce([1, 2, 3]).unwrap();
//! # }
//! ```

pub mod async_queue;
pub mod composite;
pub mod double_buffered;
pub mod error;
pub mod manager;
pub mod scheduler;

pub use async_queue::{AsyncQueue, ItemHandler};
pub use composite::AsyncDoubleBufferedQueue;
pub use double_buffered::{BatchHandler, DoubleBufferedQueue};
pub use error::{FaultHandler, ProcessingFault, QueueError, QueueResult};
pub use manager::{DoubleBufferedQueueManager, Producer};
pub use scheduler::{RuntimeScheduler, SynchronizedOperation, Task, TaskScheduler};

#[cfg(test)]
mod tests;
