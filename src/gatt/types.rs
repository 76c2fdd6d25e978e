//! GATT data model shared by the client sequencer and the server fan-out
//!
//! Everything here is plain data: identifiers, attribute targets, queued
//! units and the reports handed back to the owning client/server object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Identifiers
// ============================================================================

/// Process-unique identifier of a client read/write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        OperationId(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Identifier of one logical "notify these recipients" request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl BatchId {
    pub(crate) fn next() -> Self {
        BatchId(NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

/// Identifier of a single per-recipient notification item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl ItemId {
    pub(crate) fn next() -> Self {
        ItemId(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable identifier of a connected central (its address)
///
/// Addresses are normalized to upper case so that identity never depends on
/// how a platform happens to format them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn new(address: impl AsRef<str>) -> Self {
        RecipientId(address.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecipientId {
    fn from(address: &str) -> Self {
        RecipientId::new(address)
    }
}

// ============================================================================
// Client operations
// ============================================================================

/// Kind of attribute an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    Characteristic,
    Descriptor,
}

/// Attribute addressed by a client operation
///
/// Descriptors carry their parent characteristic because the same descriptor
/// UUID (e.g. the CCCD) appears under many characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeTarget {
    Characteristic(Uuid),
    Descriptor { characteristic: Uuid, descriptor: Uuid },
}

impl AttributeTarget {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeTarget::Characteristic(_) => AttributeKind::Characteristic,
            AttributeTarget::Descriptor { .. } => AttributeKind::Descriptor,
        }
    }

    /// UUID of the addressed attribute itself
    pub fn uuid(&self) -> Uuid {
        match self {
            AttributeTarget::Characteristic(uuid) => *uuid,
            AttributeTarget::Descriptor { descriptor, .. } => *descriptor,
        }
    }
}

impl fmt::Display for AttributeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeTarget::Characteristic(uuid) => write!(f, "char {}", uuid),
            AttributeTarget::Descriptor {
                characteristic,
                descriptor,
            } => write!(f, "desc {} of {}", descriptor, characteristic),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationVerb {
    Read,
    Write,
}

/// A queued client read or write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub id: OperationId,
    pub target: AttributeTarget,
    pub verb: OperationVerb,
    /// Bytes to write; replaced by the result bytes when a read completes
    pub payload: Option<Vec<u8>>,
}

impl Operation {
    pub fn read(target: AttributeTarget) -> Self {
        Self {
            id: OperationId::next(),
            target,
            verb: OperationVerb::Read,
            payload: None,
        }
    }

    pub fn write(target: AttributeTarget, value: impl Into<Vec<u8>>) -> Self {
        Self {
            id: OperationId::next(),
            target,
            verb: OperationVerb::Write,
            payload: Some(value.into()),
        }
    }
}

/// Result of one operation as delivered to the client owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationCompletion {
    pub id: OperationId,
    pub target: AttributeTarget,
    pub verb: OperationVerb,
    pub success: bool,
    /// Read result, the written payload for writes, `None` when flushed or rejected
    pub value: Option<Vec<u8>>,
}

// ============================================================================
// Server notifications
// ============================================================================

/// Which server push primitive to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// Unacknowledged notification
    #[default]
    Notification,
    /// Acknowledged indication
    Indication,
}

/// One logical "notify these recipients of this value" request
#[derive(Debug, Clone)]
pub struct NotificationBatch {
    pub id: BatchId,
    pub characteristic: Uuid,
    pub payload: Arc<[u8]>,
    pub recipients: Vec<RecipientId>,
    pub kind: NotifyKind,
}

impl NotificationBatch {
    pub fn new(
        characteristic: Uuid,
        payload: impl Into<Vec<u8>>,
        recipients: Vec<RecipientId>,
        kind: NotifyKind,
    ) -> Self {
        Self {
            id: BatchId::next(),
            characteristic,
            payload: Arc::from(payload.into()),
            recipients,
            kind,
        }
    }

    /// Expand into one item per recipient, in recipient order
    pub fn items(&self) -> Vec<NotificationItem> {
        self.recipients
            .iter()
            .map(|recipient| NotificationItem {
                id: ItemId::next(),
                batch_id: self.id,
                recipient: recipient.clone(),
                characteristic: self.characteristic,
                payload: Arc::clone(&self.payload),
                kind: self.kind,
            })
            .collect()
    }
}

/// A single notification to a single recipient
///
/// The payload travels with the item, so sending never touches shared
/// characteristic state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationItem {
    pub id: ItemId,
    pub batch_id: BatchId,
    pub recipient: RecipientId,
    pub characteristic: Uuid,
    pub payload: Arc<[u8]>,
    pub kind: NotifyKind,
}

/// Outcome of one batch as delivered to the server owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub characteristic: Uuid,
    pub success: bool,
    pub error_count: usize,
    pub recipient_count: usize,
}

/// Who changed a server attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    /// The host itself (echoed only with `read_internal_writes`)
    Local,
    /// A connected central
    Remote(RecipientId),
}

/// A server characteristic or descriptor took a new value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValueEvent {
    pub target: AttributeTarget,
    pub source: ValueSource,
    pub value: Vec<u8>,
}

// ============================================================================
// Failure classification
// ============================================================================

/// Why a unit was resolved as failed
///
/// Only used for logging and metrics; owners receive a plain `success` flag.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    #[error("transport reported failure")]
    Transport,

    #[error("transport refused to start the operation")]
    DispatchRejected,

    #[error("not connected")]
    NotConnected,

    #[error("server not running")]
    NotRunning,

    #[error("no recipients")]
    EmptyRecipientSet,

    #[error("flushed by disconnect or stop")]
    Flushed,

    #[error("unknown attribute")]
    UnknownAttribute,
}
