//! Owner contract: how completions leave the core
//!
//! Delegates are invoked from the sequencer's worker task, never while its
//! queue lock is held, so they may call straight back into the sequencer.
//! Which thread or loop finally surfaces the event to an application is up
//! to the embedding layer.

use super::types::{AttributeValueEvent, BatchReport, OperationCompletion};

/// Receives client read/write results
pub trait ClientDelegate: Send + Sync {
    /// Called exactly once per enqueued (or rejected) operation
    fn on_operation_complete(&self, completion: OperationCompletion);
}

/// Receives server notification batch results
pub trait ServerDelegate: Send + Sync {
    /// Called exactly once per queued batch
    fn on_batch_complete(&self, report: BatchReport);

    /// A central wrote a characteristic or descriptor, or the host did
    /// while `read_internal_writes` is set
    fn on_attribute_value(&self, _event: AttributeValueEvent) {}
}

impl<F> ClientDelegate for F
where
    F: Fn(OperationCompletion) + Send + Sync,
{
    fn on_operation_complete(&self, completion: OperationCompletion) {
        self(completion)
    }
}

impl<F> ServerDelegate for F
where
    F: Fn(BatchReport) + Send + Sync,
{
    fn on_batch_complete(&self, report: BatchReport) {
        self(report)
    }
}
