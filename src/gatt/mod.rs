//! GATT vocabulary: data model, transport contract and owner contract

pub mod delegate;
pub mod transport;
pub mod types;
pub mod uuids;

pub use delegate::{ClientDelegate, ServerDelegate};
pub use transport::{GattClientTransport, GattServerTransport, TransportError};
pub use types::{
    AttributeKind, AttributeTarget, AttributeValueEvent, BatchId, BatchReport, FailureKind, ItemId,
    NotificationBatch, NotificationItem, NotifyKind, Operation, OperationCompletion, OperationId,
    OperationVerb, RecipientId, ValueSource,
};
pub use uuids::{expand_short_uuid, parse_uuid, InvalidUuid};

/// Client Characteristic Configuration descriptor UUID
pub const CCCD_UUID: uuid::Uuid = uuid::uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// CCCD value enabling notifications
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// CCCD value enabling indications
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];

/// CCCD value disabling notifications and indications
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];
