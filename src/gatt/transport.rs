//! Platform-agnostic transport contract
//!
//! The platform BLE stack (Android, Apple, UWP or a simulator) implements
//! these traits. Every `begin_*` call starts one operation and returns
//! immediately; the outcome is reported later, on any thread, by calling
//! back into the sequencer or fan-out that issued it.

use thiserror::Error;

use super::types::{AttributeTarget, NotificationItem, OperationId};

/// Client-side (central) transport for one connection
///
/// The stack must deliver exactly one completion per successful `begin_*`
/// call, eventually, even when the operation fails.
pub trait GattClientTransport: Send + Sync {
    /// Start reading a characteristic or descriptor
    ///
    /// # Returns
    /// * `Ok(())` if the read was handed to the stack; its result arrives via
    ///   `OperationSequencer::on_transport_complete`
    /// * `Err(TransportError)` if the stack refused to start it, in which case
    ///   no completion will follow
    fn begin_read(&self, id: OperationId, target: &AttributeTarget) -> Result<(), TransportError>;

    /// Start writing a characteristic or descriptor
    fn begin_write(
        &self,
        id: OperationId,
        target: &AttributeTarget,
        value: &[u8],
    ) -> Result<(), TransportError>;
}

/// Server-side (peripheral) transport for one running server
pub trait GattServerTransport: Send + Sync {
    /// Start sending one notification or indication to one recipient
    ///
    /// The result arrives via `NotificationFanout::on_item_complete`.
    fn begin_notify(&self, item: &NotificationItem) -> Result<(), TransportError>;
}

/// Synchronous refusal by the platform stack to start an operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("BLE link not connected")]
    NotConnected,

    #[error("BLE stack busy")]
    Busy,

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Recipient not connected: {0}")]
    RecipientGone(String),

    #[error("Platform error: {0}")]
    Platform(String),
}
