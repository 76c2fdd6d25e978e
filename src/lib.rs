//! QuickBLE core - single-flight GATT sequencing for cross-platform BLE bindings
//!
//! Platform BLE stacks allow one outstanding GATT operation at a time and
//! report results through asynchronous callbacks. This crate sits between
//! those callbacks and application code:
//!
//! - [`OperationSequencer`] / [`GattClient`] queue client reads and writes,
//!   issue them one at a time and correlate each completion back to its
//!   request.
//! - [`NotificationFanout`] / [`GattServer`] expand "notify these devices"
//!   requests into per-device notifications, send them one at a time and
//!   report once per request.
//!
//! The platform layer implements [`GattClientTransport`] or
//! [`GattServerTransport`] and forwards its completion callbacks; owners
//! implement [`ClientDelegate`] or [`ServerDelegate`].

#[macro_use]
pub mod logging;

pub mod client;
pub mod config;
pub mod gatt;
pub mod queue;
pub mod runtime;
pub mod server;
pub mod sim;

pub use crate::client::{GattClient, OperationSequencer};
pub use crate::config::{
    ClientConfig, ConfigError, DisconnectedPolicy, LoggingConfig, QuickBleConfig, ServerConfig,
};
pub use crate::gatt::{
    parse_uuid, AttributeTarget, AttributeValueEvent, BatchReport, ClientDelegate,
    GattClientTransport, GattServerTransport, InvalidUuid, NotificationBatch, NotifyKind,
    Operation, OperationCompletion, OperationId, RecipientId, ServerDelegate, TransportError,
    ValueSource,
};
pub use crate::queue::{SequencerMetrics, SequencerPhase};
pub use crate::runtime::{init_runtime, SequencerError};
pub use crate::server::{GattServer, NotificationFanout};

use thiserror::Error;

/// Error types for QuickBLE setup
#[derive(Error, Debug)]
pub enum QuickBleError {
    #[error("Sequencer error: {0}")]
    Sequencer(#[from] SequencerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Apply `config`'s logging section and make sure a runtime is available
///
/// Call once from platform glue before constructing sequencers off a tokio
/// thread.
pub fn init(config: &QuickBleConfig) -> Result<(), QuickBleError> {
    logging::init(&config.logging);
    init_runtime()?;
    ble_info!("🚀 QuickBLE core initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_from_json() {
        let config =
            QuickBleConfig::from_json(r#"{"logging": {"enable_logging": false}}"#).unwrap();
        init(&config).unwrap();
        assert!(runtime::global_handle().is_some());
    }

    #[test]
    fn test_error_conversions() {
        let err: QuickBleError = SequencerError::NoRuntime.into();
        assert!(err.to_string().contains("No async runtime"));

        let err: QuickBleError = QuickBleConfig::from_json("{").unwrap_err().into();
        assert!(matches!(err, QuickBleError::Config(_)));
    }
}
