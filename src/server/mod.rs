//! Server-side notification fan-out
//!
//! Peripheral stacks can usually have only one notification in flight,
//! across every characteristic and every central. Owners think in terms of
//! "tell these N devices about this value" and expect exactly one "sent"
//! event per request. [`NotificationFanout`] bridges the two: each batch
//! expands into one item per recipient, all items share one FIFO, and batch
//! records are tracked beside it so a batch's completion is an O(1) check
//! against its last item.

pub mod gatt_server;

pub use gatt_server::GattServer;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::gatt::{
    AttributeValueEvent, BatchId, BatchReport, FailureKind, GattServerTransport, ItemId,
    NotificationBatch, NotificationItem, RecipientId, ServerDelegate,
};
use crate::queue::{spawn_worker, Command, SequencerMetrics, SequencerQueue, WorkerHandle};
use crate::runtime::{self, SequencerError};

/// Bookkeeping for a batch whose items are queued
#[derive(Debug)]
struct BatchRecord {
    id: BatchId,
    characteristic: Uuid,
    last_item: ItemId,
    recipient_count: usize,
    error_count: usize,
}

impl BatchRecord {
    fn report(&self) -> BatchReport {
        BatchReport {
            batch_id: self.id,
            characteristic: self.characteristic,
            success: self.error_count == 0,
            error_count: self.error_count,
            recipient_count: self.recipient_count,
        }
    }
}

/// Owner events, delivered in the order they were produced
#[derive(Debug)]
enum ServerEvent {
    Batch(BatchReport),
    Value(AttributeValueEvent),
}

struct ServerState {
    queue: SequencerQueue<NotificationItem>,
    /// Open batches, in the same order as their items in `queue`
    batches: VecDeque<BatchRecord>,
    running: bool,
}

struct ServerShared {
    state: Mutex<ServerState>,
    worker: WorkerHandle<NotificationItem, ServerEvent>,
}

/// Single-flight notification sender for one running server
#[derive(Clone)]
pub struct NotificationFanout {
    shared: Arc<ServerShared>,
}

impl NotificationFanout {
    /// Create a fan-out for a server that is already running
    pub fn new(
        transport: Arc<dyn GattServerTransport>,
        delegate: Arc<dyn ServerDelegate>,
    ) -> Result<Self, SequencerError> {
        let handle = runtime::resolve_handle()?;

        let shared = Arc::new_cyclic(|weak: &Weak<ServerShared>| {
            let weak = weak.clone();
            let worker = spawn_worker(
                &handle,
                "gatt-server",
                move |command: Command<NotificationItem, ServerEvent>| match command {
                    Command::Dispatch(item) => {
                        dispatch(&weak, transport.as_ref(), item);
                    }
                    Command::Deliver(ServerEvent::Batch(report)) => {
                        ble_debug!(
                            "📬 {} for {} sent ({}/{} failed)",
                            report.batch_id,
                            report.characteristic,
                            report.error_count,
                            report.recipient_count
                        );
                        delegate.on_batch_complete(report);
                    }
                    Command::Deliver(ServerEvent::Value(event)) => {
                        ble_debug!("📝 {} set by {:?}", event.target, event.source);
                        delegate.on_attribute_value(event);
                    }
                },
            );

            ServerShared {
                state: Mutex::new(ServerState {
                    queue: SequencerQueue::new(),
                    batches: VecDeque::new(),
                    running: true,
                }),
                worker,
            }
        });

        Ok(Self { shared })
    }

    /// Queue one logical notify request
    ///
    /// Always produces exactly one batch report. A stopped server or an
    /// empty recipient list resolves as failed straight away, without
    /// touching the transport.
    pub fn queue_batch(&self, batch: NotificationBatch) {
        let mut state = self.shared.state.lock();

        if !state.running {
            state.queue.record_rejected();
            self.shared.resolve_unsent(&batch, FailureKind::NotRunning);
            return;
        }

        let items = batch.items();
        let Some(last_item) = items.last().map(|item| item.id) else {
            state.queue.record_rejected();
            self.shared
                .resolve_unsent(&batch, FailureKind::EmptyRecipientSet);
            return;
        };

        ble_debug!(
            "📥 Queued {} for {} to {} recipients ({} bytes, {:?})",
            batch.id,
            batch.characteristic,
            items.len(),
            batch.payload.len(),
            batch.kind
        );

        state.batches.push_back(BatchRecord {
            id: batch.id,
            characteristic: batch.characteristic,
            last_item,
            recipient_count: items.len(),
            error_count: 0,
        });
        if let Some(head) = state.queue.extend(items) {
            self.shared.worker.dispatch(head);
        }
    }

    /// Completion callback for the notification currently in flight
    ///
    /// Some stacks only report which device acknowledged (or nothing at
    /// all), so the item being notified is tracked explicitly and resolved
    /// even if `recipient` disagrees.
    pub fn on_item_complete(&self, recipient: Option<&RecipientId>, success: bool) {
        self.shared
            .complete(None, recipient, success, FailureKind::Transport);
    }

    /// Resolve every queued batch as fully failed and clear all state
    ///
    /// Idempotent: when nothing is queued no reports are produced.
    pub fn on_server_stopped(&self) {
        let mut state = self.shared.state.lock();
        state.running = false;
        self.shared.flush(&mut state);
    }

    /// Re-arm after the server restarts
    pub fn on_server_started(&self) {
        let mut state = self.shared.state.lock();
        if !state.running {
            ble_info!("▶️ Server running, accepting notifications");
        }
        state.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Notification items queued, including the one in flight
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Hand a server attribute change to the owner
    ///
    /// Sent through the same worker as batch reports so owners see value
    /// changes and "sent" events in the order they happened.
    pub(crate) fn report_value(&self, event: AttributeValueEvent) {
        let _state = self.shared.state.lock();
        self.shared.worker.deliver(ServerEvent::Value(event));
    }

    pub fn metrics(&self) -> SequencerMetrics {
        let state = self.shared.state.lock();
        SequencerMetrics {
            open_batches: state.batches.len(),
            ..state.queue.metrics()
        }
    }
}

impl ServerShared {
    /// Report a batch that never reached the queue; call with the lock held
    fn resolve_unsent(&self, batch: &NotificationBatch, reason: FailureKind) {
        let error_count = batch.recipients.len().max(1);
        ble_debug!("❌ {} for {} not sent: {}", batch.id, batch.characteristic, reason);
        self.worker.deliver(ServerEvent::Batch(BatchReport {
            batch_id: batch.id,
            characteristic: batch.characteristic,
            success: false,
            error_count,
            recipient_count: batch.recipients.len(),
        }));
    }

    fn complete(
        &self,
        expected: Option<ItemId>,
        recipient: Option<&RecipientId>,
        success: bool,
        failure: FailureKind,
    ) {
        let mut state = self.state.lock();

        match (recipient, state.queue.current()) {
            (Some(reported), Some(current)) if *reported != current.recipient => {
                ble_warn!(
                    "⚠️ Completion reported for {} while notifying {}; resolving current item",
                    reported,
                    current.recipient
                );
            }
            _ => {}
        }

        let resolved = match expected {
            Some(id) => state.queue.complete(id, success),
            None => state.queue.complete_current(success),
        };
        let Some(done) = resolved else {
            ble_warn!("⚠️ Ignoring stale notification completion (success: {})", success);
            return;
        };

        let item = done.unit;
        if !success {
            if failure == FailureKind::DispatchRejected {
                state.queue.record_dispatch_rejected();
            }
            ble_debug!("❌ Notification to {} failed: {}", item.recipient, failure);
        }
        let finished = match state.batches.front_mut() {
            Some(batch) if batch.id == item.batch_id => {
                if !success {
                    batch.error_count += 1;
                }
                item.id == batch.last_item
            }
            _ => {
                ble_error!("❌ {} has no open batch record", item.batch_id);
                false
            }
        };
        if finished {
            if let Some(batch) = state.batches.pop_front() {
                self.worker.deliver(ServerEvent::Batch(batch.report()));
            }
        }

        if let Some(next) = done.next {
            self.worker.dispatch(next);
        }
    }

    fn flush(&self, state: &mut ServerState) {
        let flushed = state.queue.begin_flush();
        if !state.batches.is_empty() {
            ble_info!(
                "⏹️ Server stopped, failing {} batches ({} queued notifications)",
                state.batches.len(),
                flushed.len()
            );
        }
        for mut batch in state.batches.drain(..) {
            batch.error_count = batch.recipient_count;
            self.worker.deliver(ServerEvent::Batch(batch.report()));
        }
        state.queue.end_flush();
    }
}

impl Drop for ServerShared {
    fn drop(&mut self) {
        let mut state = std::mem::replace(
            self.state.get_mut(),
            ServerState {
                queue: SequencerQueue::new(),
                batches: VecDeque::new(),
                running: false,
            },
        );
        self.flush(&mut state);
    }
}

/// Hand `item` to the transport if it is still the in-flight head
fn dispatch(
    shared: &Weak<ServerShared>,
    transport: &dyn GattServerTransport,
    item: NotificationItem,
) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    if !shared.state.lock().queue.claim(item.id) {
        ble_debug!("Skipping notification to {}: no longer in flight", item.recipient);
        return;
    }

    ble_debug!(
        "📤 Notifying {} of {} ({})",
        item.recipient,
        item.characteristic,
        hex::encode(&item.payload)
    );

    match catch_unwind(AssertUnwindSafe(|| transport.begin_notify(&item))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            ble_warn!("⚠️ Transport refused notification to {}: {}", item.recipient, e);
            shared.complete(Some(item.id), None, false, FailureKind::DispatchRejected);
        }
        Err(_) => {
            ble_error!("❌ Transport panicked notifying {}", item.recipient);
            shared.complete(Some(item.id), None, false, FailureKind::DispatchRejected);
        }
    }
}
