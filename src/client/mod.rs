//! Client-side GATT operation sequencing
//!
//! Most central stacks allow one outstanding read/write per connection and
//! report its result later through a callback. [`OperationSequencer`] lets
//! callers fire requests without waiting: it queues them, hands exactly one
//! at a time to the transport, and correlates each completion callback back
//! to the request that caused it.

pub mod gatt_client;

pub use gatt_client::GattClient;

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use crate::config::{ClientConfig, DisconnectedPolicy};
use crate::gatt::{
    ClientDelegate, FailureKind, GattClientTransport, Operation, OperationCompletion, OperationId,
    OperationVerb,
};
use crate::queue::{spawn_worker, Command, SequencerMetrics, SequencerQueue, WorkerHandle};
use crate::runtime::{self, SequencerError};

struct ClientState {
    queue: SequencerQueue<Operation>,
    connected: bool,
}

struct ClientShared {
    state: Mutex<ClientState>,
    worker: WorkerHandle<Operation, OperationCompletion>,
    config: ClientConfig,
}

/// Single-flight read/write sequencer for one connection
///
/// Cloning is cheap and every clone drives the same queue, so the
/// application thread and the platform callback thread can each hold one.
#[derive(Clone)]
pub struct OperationSequencer {
    shared: Arc<ClientShared>,
}

impl OperationSequencer {
    /// Create a sequencer for a connection that is already established
    pub fn new(
        transport: Arc<dyn GattClientTransport>,
        delegate: Arc<dyn ClientDelegate>,
        config: ClientConfig,
    ) -> Result<Self, SequencerError> {
        let handle = runtime::resolve_handle()?;

        let shared = Arc::new_cyclic(|weak: &Weak<ClientShared>| {
            let weak = weak.clone();
            let worker = spawn_worker(
                &handle,
                "gatt-client",
                move |command: Command<Operation, OperationCompletion>| match command {
                    Command::Dispatch(operation) => {
                        dispatch(&weak, transport.as_ref(), operation);
                    }
                    Command::Deliver(completion) => {
                        ble_debug!(
                            "📬 {} {:?} {} complete (success: {})",
                            completion.id,
                            completion.verb,
                            completion.target,
                            completion.success
                        );
                        delegate.on_operation_complete(completion);
                    }
                },
            );

            ClientShared {
                state: Mutex::new(ClientState {
                    queue: SequencerQueue::new(),
                    connected: true,
                }),
                worker,
                config,
            }
        });

        Ok(Self { shared })
    }

    /// Queue a read or write
    ///
    /// Returns immediately; the outcome is delivered to the delegate. While
    /// disconnected the request is resolved as failed or dropped according
    /// to [`ClientConfig::disconnected_enqueue`].
    pub fn enqueue(&self, operation: Operation) {
        let mut state = self.shared.state.lock();

        if !state.connected {
            match self.shared.config.disconnected_enqueue {
                DisconnectedPolicy::Drop => {
                    ble_warn!(
                        "⚠️ Dropping {} on {}: not connected",
                        operation.id,
                        operation.target
                    );
                }
                DisconnectedPolicy::Reject => {
                    state.queue.record_rejected();
                    self.shared
                        .resolve_failed(operation, FailureKind::NotConnected);
                }
            }
            return;
        }

        ble_debug!(
            "📥 Queued {} {:?} {} (pending: {})",
            operation.id,
            operation.verb,
            operation.target,
            state.queue.len() + 1
        );
        if let Some(head) = state.queue.push(operation) {
            self.shared.worker.dispatch(head);
        }
    }

    /// Resolve an operation as failed without queueing it
    ///
    /// Used by callers that know up front the request cannot succeed (e.g.
    /// the attribute was never discovered) but still owe a completion.
    pub fn reject(&self, operation: Operation, reason: FailureKind) {
        let mut state = self.shared.state.lock();
        state.queue.record_rejected();
        self.shared.resolve_failed(operation, reason);
    }

    /// Completion callback for whichever operation is in flight
    ///
    /// For reads `value` is the bytes read; for writes it is ignored and the
    /// written payload is echoed back to the delegate.
    pub fn on_transport_complete(&self, success: bool, value: Option<Vec<u8>>) {
        self.shared
            .complete(None, success, value, FailureKind::Transport);
    }

    /// Completion callback for transports that report the operation id
    ///
    /// Ignored unless `id` is the operation currently in flight.
    pub fn complete_operation(&self, id: OperationId, success: bool, value: Option<Vec<u8>>) {
        self.shared
            .complete(Some(id), success, value, FailureKind::Transport);
    }

    /// Fail every queued operation, including the one in flight
    ///
    /// Idempotent: when nothing is queued no callbacks are produced.
    pub fn on_disconnected(&self) {
        let mut state = self.shared.state.lock();
        state.connected = false;

        let flushed = state.queue.begin_flush();
        if !flushed.is_empty() {
            ble_info!("🔌 Disconnected, failing {} queued operations", flushed.len());
        }
        for operation in flushed {
            self.shared.resolve_failed(operation, FailureKind::Flushed);
        }
        state.queue.end_flush();
    }

    /// Re-arm after a reconnect
    pub fn on_connected(&self) {
        let mut state = self.shared.state.lock();
        if !state.connected {
            ble_info!("🔗 Connected, accepting operations");
        }
        state.connected = true;
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    /// Operations queued, including the one in flight
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn metrics(&self) -> SequencerMetrics {
        self.shared.state.lock().queue.metrics()
    }
}

impl ClientShared {
    /// Must be called with the state lock held so delivery order matches
    /// resolution order
    fn resolve_failed(&self, operation: Operation, reason: FailureKind) {
        ble_debug!("❌ {} {} failed: {}", operation.id, operation.target, reason);
        self.worker.deliver(OperationCompletion {
            id: operation.id,
            target: operation.target,
            verb: operation.verb,
            success: false,
            value: None,
        });
    }

    fn complete(
        &self,
        expected: Option<OperationId>,
        success: bool,
        value: Option<Vec<u8>>,
        failure: FailureKind,
    ) {
        let mut state = self.state.lock();

        let resolved = match expected {
            Some(id) => state.queue.complete(id, success),
            None => state.queue.complete_current(success),
        };
        let Some(done) = resolved else {
            ble_warn!(
                "⚠️ Ignoring stale completion (expected: {:?}, success: {})",
                expected,
                success
            );
            return;
        };

        let mut operation = done.unit;
        if operation.verb == OperationVerb::Read {
            operation.payload = value;
        }
        if !success {
            if failure == FailureKind::DispatchRejected {
                state.queue.record_dispatch_rejected();
            }
            ble_debug!("❌ {} {} failed: {}", operation.id, operation.target, failure);
        }

        self.worker.deliver(OperationCompletion {
            id: operation.id,
            target: operation.target,
            verb: operation.verb,
            success,
            value: operation.payload,
        });

        if let Some(next) = done.next {
            self.worker.dispatch(next);
        }
    }
}

impl Drop for ClientShared {
    fn drop(&mut self) {
        // Last handle gone: nobody can complete what is still queued
        let state = self.state.get_mut();
        let flushed = state.queue.begin_flush();
        state.queue.end_flush();
        for operation in flushed {
            self.worker.deliver(OperationCompletion {
                id: operation.id,
                target: operation.target,
                verb: operation.verb,
                success: false,
                value: None,
            });
        }
    }
}

/// Hand `operation` to the transport if it is still the in-flight head
fn dispatch(
    shared: &Weak<ClientShared>,
    transport: &dyn GattClientTransport,
    operation: Operation,
) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    if !shared.state.lock().queue.claim(operation.id) {
        ble_debug!("Skipping {}: no longer in flight", operation.id);
        return;
    }

    ble_debug!(
        "📤 Dispatching {} {:?} {}",
        operation.id,
        operation.verb,
        operation.target
    );

    let started = catch_unwind(AssertUnwindSafe(|| match operation.verb {
        OperationVerb::Read => transport.begin_read(operation.id, &operation.target),
        OperationVerb::Write => transport.begin_write(
            operation.id,
            &operation.target,
            operation.payload.as_deref().unwrap_or_default(),
        ),
    }));

    match started {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            ble_warn!("⚠️ Transport refused {}: {}", operation.id, e);
            shared.complete(Some(operation.id), false, None, FailureKind::DispatchRejected);
        }
        Err(_) => {
            ble_error!("❌ Transport panicked starting {}", operation.id);
            shared.complete(Some(operation.id), false, None, FailureKind::DispatchRejected);
        }
    }
}
