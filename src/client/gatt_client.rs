//! GATT client facade
//!
//! Wraps an [`OperationSequencer`] with the attribute table discovered on
//! the remote device, so hosts can address characteristics and descriptors
//! by UUID and subscribe to notifications with a single call.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::OperationSequencer;
use crate::config::ClientConfig;
use crate::gatt::{
    AttributeTarget, ClientDelegate, FailureKind, GattClientTransport, Operation, CCCD_UUID,
    DISABLE_NOTIFICATION_VALUE, ENABLE_NOTIFICATION_VALUE,
};
use crate::queue::SequencerMetrics;
use crate::runtime::SequencerError;

/// Client view of one connected peripheral
pub struct GattClient {
    sequencer: OperationSequencer,
    /// Discovered characteristics and the descriptors under each
    attributes: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl GattClient {
    pub fn new(
        transport: Arc<dyn GattClientTransport>,
        delegate: Arc<dyn ClientDelegate>,
        config: ClientConfig,
    ) -> Result<Self, SequencerError> {
        Ok(Self {
            sequencer: OperationSequencer::new(transport, delegate, config)?,
            attributes: RwLock::new(HashMap::new()),
        })
    }

    /// Sequencer used for this connection (for wiring platform callbacks)
    pub fn sequencer(&self) -> &OperationSequencer {
        &self.sequencer
    }

    // ------------------------------------------------------------------
    // Attribute table
    // ------------------------------------------------------------------

    /// Record a characteristic found during service discovery
    pub fn register_characteristic(&self, characteristic: Uuid) {
        self.attributes.write().entry(characteristic).or_default();
    }

    /// Record a descriptor found under `characteristic`
    ///
    /// Returns `false` if the characteristic itself is unknown.
    pub fn register_descriptor(&self, characteristic: Uuid, descriptor: Uuid) -> bool {
        match self.attributes.write().get_mut(&characteristic) {
            Some(descriptors) => {
                descriptors.insert(descriptor);
                true
            }
            None => false,
        }
    }

    pub fn characteristics(&self) -> Vec<Uuid> {
        let mut list: Vec<Uuid> = self.attributes.read().keys().copied().collect();
        list.sort();
        list
    }

    pub fn has_characteristic(&self, characteristic: Uuid) -> bool {
        self.attributes.read().contains_key(&characteristic)
    }

    fn has_descriptor(&self, characteristic: Uuid, descriptor: Uuid) -> bool {
        self.attributes
            .read()
            .get(&characteristic)
            .is_some_and(|descriptors| descriptors.contains(&descriptor))
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Read any discovered attribute
    ///
    /// Hosts holding UUID strings can parse them straight into a target,
    /// short forms included: `client.read("2A37/2902".parse()?)`.
    pub fn read(&self, target: AttributeTarget) {
        let known = self.is_known(&target);
        self.submit(Operation::read(target), known);
    }

    /// Write any discovered attribute
    pub fn write(&self, target: AttributeTarget, value: impl Into<Vec<u8>>) {
        let known = self.is_known(&target);
        self.submit(Operation::write(target, value), known);
    }

    pub fn read_characteristic(&self, characteristic: Uuid) {
        self.read(AttributeTarget::Characteristic(characteristic));
    }

    pub fn write_characteristic(&self, characteristic: Uuid, value: impl Into<Vec<u8>>) {
        self.write(AttributeTarget::Characteristic(characteristic), value);
    }

    pub fn read_descriptor(&self, characteristic: Uuid, descriptor: Uuid) {
        self.read(AttributeTarget::Descriptor {
            characteristic,
            descriptor,
        });
    }

    pub fn write_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: impl Into<Vec<u8>>,
    ) {
        let target = AttributeTarget::Descriptor {
            characteristic,
            descriptor,
        };
        self.write(target, value);
    }

    /// Enable or disable notifications by writing the characteristic's CCCD
    pub fn subscribe(&self, characteristic: Uuid, enable: bool) {
        let value = if enable {
            ENABLE_NOTIFICATION_VALUE
        } else {
            DISABLE_NOTIFICATION_VALUE
        };
        ble_debug!(
            "{} notifications for {}",
            if enable { "Enabling" } else { "Disabling" },
            characteristic
        );
        self.write_descriptor(characteristic, CCCD_UUID, value.to_vec());
    }

    fn is_known(&self, target: &AttributeTarget) -> bool {
        match *target {
            AttributeTarget::Characteristic(characteristic) => {
                self.has_characteristic(characteristic)
            }
            AttributeTarget::Descriptor {
                characteristic,
                descriptor,
            } => self.has_descriptor(characteristic, descriptor),
        }
    }

    fn submit(&self, operation: Operation, known: bool) {
        if known {
            self.sequencer.enqueue(operation);
        } else {
            ble_warn!("⚠️ {} not discovered on this device", operation.target);
            self.sequencer.reject(operation, FailureKind::UnknownAttribute);
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    pub fn on_connected(&self) {
        self.sequencer.on_connected();
    }

    /// Fail queued work and forget discovered attributes
    pub fn on_disconnected(&self) {
        self.sequencer.on_disconnected();
        self.attributes.write().clear();
    }

    pub fn is_connected(&self) -> bool {
        self.sequencer.is_connected()
    }

    pub fn metrics(&self) -> SequencerMetrics {
        self.sequencer.metrics()
    }
}
