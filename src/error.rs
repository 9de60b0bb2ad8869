//! Queue Error Types

use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("no processing function has been assigned")]
    NoProcessor,

    #[error("producer handle has already been released")]
    ProducerReleased,
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Out-of-band report of a processing callback failure.
///
/// Faults carry enough context to identify the failing unit of work but not
/// the items themselves; by the time a fault is raised the items have already
/// been handed to the callback that failed on them.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{context} failed: {detail}")]
pub struct ProcessingFault {
    /// Which processing path failed, e.g. `item handler` or `batch handler (17 items)`
    pub context: String,
    /// Rendered panic payload of the failed callback
    pub detail: String,
}

impl ProcessingFault {
    pub(crate) fn new(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

/// Handler invoked with each processing fault, potentially from several
/// worker threads at once.
pub type FaultHandler = Arc<dyn Fn(ProcessingFault) + Send + Sync>;

/// Shared delivery point for processing faults.
///
/// Clones share the same installed handler, which lets a composite component
/// hand one hook to several inner stages. With no handler installed faults
/// are logged and dropped.
#[derive(Clone, Default)]
pub(crate) struct FaultHook {
    handler: Arc<RwLock<Option<FaultHandler>>>,
}

impl FaultHook {
    pub(crate) fn set(&self, handler: FaultHandler) {
        *self.handler.write() = Some(handler);
    }

    pub(crate) fn report(&self, fault: ProcessingFault) {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler(fault),
            None => log::warn!("dropping unobserved processing fault: {fault}"),
        }
    }
}

/// Render a panic payload into something loggable.
pub(crate) fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_error_display() {
        assert_eq!(
            QueueError::NoProcessor.to_string(),
            "no processing function has been assigned"
        );
        assert_eq!(
            QueueError::ProducerReleased.to_string(),
            "producer handle has already been released"
        );
    }

    #[test]
    fn test_fault_display_includes_context_and_detail() {
        let fault = ProcessingFault::new("batch handler (3 items)", "index out of bounds");
        assert_eq!(
            fault.to_string(),
            "batch handler (3 items) failed: index out of bounds"
        );
    }

    #[test]
    fn test_hook_delivers_to_installed_handler() {
        let hook = FaultHook::default();
        let seen: Arc<Mutex<Vec<ProcessingFault>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        hook.set(Arc::new(move |fault| sink.lock().unwrap().push(fault)));

        hook.report(ProcessingFault::new("item handler", "boom"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].detail, "boom");
    }

    #[test]
    fn test_hook_without_handler_drops_fault() {
        // Must not panic; the fault is logged and discarded.
        let hook = FaultHook::default();
        hook.report(ProcessingFault::new("item handler", "boom"));
    }

    #[test]
    fn test_clones_share_one_handler() {
        let hook = FaultHook::default();
        let forwarded = hook.clone();
        let seen = Arc::new(Mutex::new(0usize));

        let sink = Arc::clone(&seen);
        hook.set(Arc::new(move |_| *sink.lock().unwrap() += 1));

        forwarded.report(ProcessingFault::new("item handler", "boom"));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_panic_detail_rendering() {
        assert_eq!(panic_detail(Box::new("static message")), "static message");
        assert_eq!(
            panic_detail(Box::new("owned message".to_string())),
            "owned message"
        );
        assert_eq!(panic_detail(Box::new(42u32)), "opaque panic payload");
    }
}
