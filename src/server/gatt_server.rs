//! GATT server facade
//!
//! Owns the local attribute values and the set of connected centrals, and
//! turns value changes into notification batches on the shared
//! [`NotificationFanout`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::NotificationFanout;
use crate::config::ServerConfig;
use crate::gatt::{
    AttributeTarget, AttributeValueEvent, GattServerTransport, NotificationBatch, NotifyKind,
    RecipientId, ServerDelegate, TransportError, ValueSource,
};
use crate::queue::SequencerMetrics;
use crate::runtime::SequencerError;

#[derive(Debug, Clone)]
struct CharacteristicEntry {
    value: Vec<u8>,
    kind: NotifyKind,
    descriptors: HashMap<Uuid, Vec<u8>>,
}

/// Local peripheral: attribute values plus connected devices
pub struct GattServer {
    fanout: NotificationFanout,
    characteristics: RwLock<HashMap<Uuid, CharacteristicEntry>>,
    devices: RwLock<Vec<RecipientId>>,
    config: ServerConfig,
}

impl GattServer {
    pub fn new(
        transport: Arc<dyn GattServerTransport>,
        delegate: Arc<dyn ServerDelegate>,
        config: ServerConfig,
    ) -> Result<Self, SequencerError> {
        Ok(Self {
            fanout: NotificationFanout::new(transport, delegate)?,
            characteristics: RwLock::new(HashMap::new()),
            devices: RwLock::new(Vec::new()),
            config,
        })
    }

    /// Fan-out used by this server (for wiring platform callbacks)
    pub fn fanout(&self) -> &NotificationFanout {
        &self.fanout
    }

    /// Add or replace a characteristic and its initial value
    ///
    /// Replacing a characteristic drops its descriptors.
    pub fn add_characteristic(
        &self,
        characteristic: Uuid,
        initial: impl Into<Vec<u8>>,
        kind: NotifyKind,
    ) {
        self.characteristics.write().insert(
            characteristic,
            CharacteristicEntry {
                value: initial.into(),
                kind,
                descriptors: HashMap::new(),
            },
        );
    }

    /// Add or replace a descriptor under an existing characteristic
    ///
    /// Returns `false` if the characteristic is unknown.
    pub fn add_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        initial: impl Into<Vec<u8>>,
    ) -> bool {
        match self.characteristics.write().get_mut(&characteristic) {
            Some(entry) => {
                entry.descriptors.insert(descriptor, initial.into());
                true
            }
            None => false,
        }
    }

    pub fn characteristic_value(&self, characteristic: Uuid) -> Option<Vec<u8>> {
        self.characteristics
            .read()
            .get(&characteristic)
            .map(|entry| entry.value.clone())
    }

    pub fn descriptor_value(&self, characteristic: Uuid, descriptor: Uuid) -> Option<Vec<u8>> {
        self.characteristics
            .read()
            .get(&characteristic)?
            .descriptors
            .get(&descriptor)
            .cloned()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&self) {
        self.fanout.on_server_started();
    }

    /// Fail every queued batch and forget connected devices
    pub fn stop(&self) {
        self.fanout.on_server_stopped();
        self.devices.write().clear();
    }

    pub fn is_running(&self) -> bool {
        self.fanout.is_running()
    }

    pub fn device_connected(&self, device: RecipientId) {
        let mut devices = self.devices.write();
        if !devices.contains(&device) {
            ble_info!("🔗 {} connected", device);
            devices.push(device);
        }
    }

    pub fn device_disconnected(&self, device: &RecipientId) {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|d| d != device);
        if devices.len() != before {
            ble_info!("🔌 {} disconnected", device);
        }
    }

    /// Connected devices in connection order
    pub fn connected_devices(&self) -> Vec<RecipientId> {
        self.devices.read().clone()
    }

    // ------------------------------------------------------------------
    // Local writes
    // ------------------------------------------------------------------

    /// Set a characteristic's value, optionally notifying every device
    ///
    /// Returns `false` if the characteristic is unknown. With
    /// `read_internal_writes` the owner also receives a
    /// [`ValueSource::Local`] event, ahead of the batch report.
    pub fn write_characteristic(
        &self,
        characteristic: Uuid,
        value: impl Into<Vec<u8>>,
        notify: bool,
    ) -> bool {
        let value = value.into();
        let Some(kind) = self.store(characteristic, &value) else {
            ble_warn!("⚠️ Write to unknown characteristic {}", characteristic);
            return false;
        };
        self.echo_local(AttributeTarget::Characteristic(characteristic), &value);
        if notify {
            let recipients = self.connected_devices();
            self.fanout
                .queue_batch(NotificationBatch::new(characteristic, value, recipients, kind));
        }
        true
    }

    /// Set a descriptor's value; returns `false` if it was never added
    pub fn write_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: impl Into<Vec<u8>>,
    ) -> bool {
        let value = value.into();
        if !self.store_descriptor(characteristic, descriptor, &value) {
            ble_warn!("⚠️ Write to unknown descriptor {}/{}", characteristic, descriptor);
            return false;
        }
        self.echo_local(
            AttributeTarget::Descriptor {
                characteristic,
                descriptor,
            },
            &value,
        );
        true
    }

    // ------------------------------------------------------------------
    // Requests from centrals
    // ------------------------------------------------------------------

    /// Apply a characteristic write made by a central and notify the others
    ///
    /// The writer is registered as connected, since some stacks only surface
    /// a central through its first request. The owner receives a
    /// [`ValueSource::Remote`] event. The writer already knows the new value,
    /// so it is left out of the notification unless `notify_changing_device`
    /// is set.
    pub fn handle_remote_write(
        &self,
        writer: &RecipientId,
        characteristic: Uuid,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), TransportError> {
        self.device_connected(writer.clone());
        let value = value.into();
        let Some(kind) = self.store(characteristic, &value) else {
            ble_warn!("⚠️ {} wrote unknown characteristic {}", writer, characteristic);
            return Err(TransportError::AttributeNotFound(characteristic.to_string()));
        };

        self.fanout.report_value(AttributeValueEvent {
            target: AttributeTarget::Characteristic(characteristic),
            source: ValueSource::Remote(writer.clone()),
            value: value.clone(),
        });

        let recipients: Vec<RecipientId> = self
            .devices
            .read()
            .iter()
            .filter(|d| self.config.notify_changing_device || *d != writer)
            .cloned()
            .collect();
        self.fanout
            .queue_batch(NotificationBatch::new(characteristic, value, recipients, kind));
        Ok(())
    }

    /// Apply a descriptor write made by a central
    ///
    /// Descriptor writes are reported to the owner but never notified.
    pub fn handle_remote_descriptor_write(
        &self,
        writer: &RecipientId,
        characteristic: Uuid,
        descriptor: Uuid,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), TransportError> {
        self.device_connected(writer.clone());
        let value = value.into();
        if !self.store_descriptor(characteristic, descriptor, &value) {
            ble_warn!(
                "⚠️ {} wrote unknown descriptor {}/{}",
                writer,
                characteristic,
                descriptor
            );
            return Err(TransportError::AttributeNotFound(descriptor.to_string()));
        }

        self.fanout.report_value(AttributeValueEvent {
            target: AttributeTarget::Descriptor {
                characteristic,
                descriptor,
            },
            source: ValueSource::Remote(writer.clone()),
            value,
        });
        Ok(())
    }

    /// Answer a central's read of a characteristic or descriptor
    pub fn handle_remote_read(
        &self,
        reader: &RecipientId,
        target: &AttributeTarget,
    ) -> Result<Vec<u8>, TransportError> {
        self.device_connected(reader.clone());
        let value = match *target {
            AttributeTarget::Characteristic(characteristic) => {
                self.characteristic_value(characteristic)
            }
            AttributeTarget::Descriptor {
                characteristic,
                descriptor,
            } => self.descriptor_value(characteristic, descriptor),
        };
        value.ok_or_else(|| {
            ble_warn!("⚠️ {} read unknown attribute {}", reader, target);
            TransportError::AttributeNotFound(target.uuid().to_string())
        })
    }

    /// Send the current value of `characteristic` to one device
    ///
    /// An unknown characteristic or device still yields a (failed) report.
    pub fn notify_device(&self, characteristic: Uuid, device: &RecipientId) {
        let entry = self.characteristics.read().get(&characteristic).cloned();
        let connected = self.devices.read().contains(device);

        let batch = match entry {
            Some(entry) if connected => NotificationBatch::new(
                characteristic,
                entry.value,
                vec![device.clone()],
                entry.kind,
            ),
            Some(entry) => {
                ble_warn!("⚠️ {} is not connected", device);
                NotificationBatch::new(characteristic, entry.value, Vec::new(), entry.kind)
            }
            None => {
                ble_warn!("⚠️ Notify for unknown characteristic {}", characteristic);
                NotificationBatch::new(
                    characteristic,
                    Vec::<u8>::new(),
                    Vec::new(),
                    NotifyKind::default(),
                )
            }
        };
        self.fanout.queue_batch(batch);
    }

    pub fn metrics(&self) -> SequencerMetrics {
        self.fanout.metrics()
    }

    fn store(&self, characteristic: Uuid, value: &[u8]) -> Option<NotifyKind> {
        let mut characteristics = self.characteristics.write();
        let entry = characteristics.get_mut(&characteristic)?;
        entry.value = value.to_vec();
        Some(entry.kind)
    }

    fn store_descriptor(&self, characteristic: Uuid, descriptor: Uuid, value: &[u8]) -> bool {
        let mut characteristics = self.characteristics.write();
        match characteristics
            .get_mut(&characteristic)
            .and_then(|entry| entry.descriptors.get_mut(&descriptor))
        {
            Some(slot) => {
                *slot = value.to_vec();
                true
            }
            None => false,
        }
    }

    fn echo_local(&self, target: AttributeTarget, value: &[u8]) {
        if self.config.read_internal_writes {
            self.fanout.report_value(AttributeValueEvent {
                target,
                source: ValueSource::Local,
                value: value.to_vec(),
            });
        }
    }
}
