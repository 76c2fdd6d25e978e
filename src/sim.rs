//! Loopback peripheral for demos, benches and tests
//!
//! [`SimulatedPeripheral`] accepts work through both transport traits and
//! answers each request after a delay, the way a radio stack would call back
//! later from its own thread. Answers arrive as [`SimEvent`]s on a channel
//! that the host drains and routes back into its sequencer or fan-out.
//!
//! It also counts how many requests are outstanding at once, which makes
//! the single-flight guarantee directly observable.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::client::OperationSequencer;
use crate::gatt::{
    AttributeTarget, GattClientTransport, GattServerTransport, NotificationItem, OperationId,
    RecipientId, TransportError,
};
use crate::runtime::{self, SequencerError};
use crate::server::NotificationFanout;

/// Response timing for the simulated radio
#[derive(Debug, Clone, Copy)]
pub struct SimTiming {
    pub base_delay: Duration,
    /// Upper bound of the uniform random delay added to `base_delay`
    pub jitter: Duration,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2),
            jitter: Duration::from_millis(3),
        }
    }
}

impl SimTiming {
    /// Answer on the next runtime tick
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn sample(&self) -> Duration {
        let jitter_us = self.jitter.as_micros() as u64;
        if jitter_us == 0 {
            return self.base_delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_us);
        self.base_delay + Duration::from_micros(extra)
    }
}

/// A request as seen by the failure predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimRequest {
    Read(AttributeTarget),
    Write(AttributeTarget, Vec<u8>),
    Notify(RecipientId),
}

/// A completion the host must route back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Client {
        id: OperationId,
        success: bool,
        value: Option<Vec<u8>>,
    },
    Server {
        recipient: RecipientId,
        success: bool,
    },
}

impl SimEvent {
    /// Feed this completion into whichever side it belongs to
    pub fn route(self, client: Option<&OperationSequencer>, server: Option<&NotificationFanout>) {
        match self {
            SimEvent::Client { id, success, value } => match client {
                Some(client) => client.complete_operation(id, success, value),
                None => ble_warn!("⚠️ Dropping client completion for {}: no sequencer", id),
            },
            SimEvent::Server { recipient, success } => match server {
                Some(server) => server.on_item_complete(Some(&recipient), success),
                None => {
                    ble_warn!("⚠️ Dropping notify completion for {}: no fan-out", recipient)
                }
            },
        }
    }
}

type FailurePredicate = Box<dyn Fn(&SimRequest) -> bool + Send + Sync>;

#[derive(Default)]
struct FlightCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl FlightCounter {
    fn begin(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process stand-in for a remote peripheral and its centrals
pub struct SimulatedPeripheral {
    runtime: Handle,
    events: mpsc::UnboundedSender<SimEvent>,
    timing: SimTiming,
    fail_when: Option<FailurePredicate>,
    /// Attribute values, keyed by characteristic or descriptor UUID
    values: Arc<Mutex<HashMap<Uuid, Vec<u8>>>>,
    client_flight: Arc<FlightCounter>,
    server_flight: Arc<FlightCounter>,
}

impl SimulatedPeripheral {
    pub fn new(
        timing: SimTiming,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SimEvent>), SequencerError> {
        Self::build(timing, None)
    }

    /// Like [`SimulatedPeripheral::new`], but requests matching `fail_when`
    /// complete with `success = false`
    pub fn with_failures(
        timing: SimTiming,
        fail_when: impl Fn(&SimRequest) -> bool + Send + Sync + 'static,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SimEvent>), SequencerError> {
        Self::build(timing, Some(Box::new(fail_when)))
    }

    fn build(
        timing: SimTiming,
        fail_when: Option<FailurePredicate>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SimEvent>), SequencerError> {
        let runtime = runtime::resolve_handle()?;
        let (events, rx) = mpsc::unbounded_channel();
        let peripheral = Arc::new(Self {
            runtime,
            events,
            timing,
            fail_when,
            values: Arc::new(Mutex::new(HashMap::new())),
            client_flight: Arc::default(),
            server_flight: Arc::default(),
        });
        Ok((peripheral, rx))
    }

    /// Preload the value a read of `attribute` returns
    pub fn set_value(&self, attribute: Uuid, value: impl Into<Vec<u8>>) {
        self.values.lock().insert(attribute, value.into());
    }

    pub fn value(&self, attribute: Uuid) -> Option<Vec<u8>> {
        self.values.lock().get(&attribute).cloned()
    }

    /// Most client requests ever outstanding at the same time
    pub fn peak_client_in_flight(&self) -> usize {
        self.client_flight.peak.load(Ordering::SeqCst)
    }

    /// Most notifications ever outstanding at the same time
    pub fn peak_server_in_flight(&self) -> usize {
        self.server_flight.peak.load(Ordering::SeqCst)
    }

    pub fn client_requests(&self) -> usize {
        self.client_flight.total.load(Ordering::SeqCst)
    }

    pub fn notifications_sent(&self) -> usize {
        self.server_flight.total.load(Ordering::SeqCst)
    }

    fn should_fail(&self, request: &SimRequest) -> bool {
        self.fail_when.as_ref().is_some_and(|fail| fail(request))
    }

    fn answer_later(
        &self,
        counter: &Arc<FlightCounter>,
        event: SimEvent,
        apply: Option<(Uuid, Vec<u8>)>,
    ) {
        counter.begin();
        let counter = Arc::clone(counter);
        let events = self.events.clone();
        let values = Arc::clone(&self.values);
        let delay = self.timing.sample();

        self.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some((attribute, value)) = apply {
                values.lock().insert(attribute, value);
            }
            counter.end();
            let _ = events.send(event);
        });
    }
}

impl GattClientTransport for SimulatedPeripheral {
    fn begin_read(&self, id: OperationId, target: &AttributeTarget) -> Result<(), TransportError> {
        let success = !self.should_fail(&SimRequest::Read(*target));
        let value = if success {
            Some(self.value(target.uuid()).unwrap_or_default())
        } else {
            None
        };
        self.answer_later(
            &self.client_flight,
            SimEvent::Client { id, success, value },
            None,
        );
        Ok(())
    }

    fn begin_write(
        &self,
        id: OperationId,
        target: &AttributeTarget,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let success = !self.should_fail(&SimRequest::Write(*target, value.to_vec()));
        let apply = success.then(|| (target.uuid(), value.to_vec()));
        self.answer_later(
            &self.client_flight,
            SimEvent::Client {
                id,
                success,
                value: None,
            },
            apply,
        );
        Ok(())
    }
}

impl GattServerTransport for SimulatedPeripheral {
    fn begin_notify(&self, item: &NotificationItem) -> Result<(), TransportError> {
        let success = !self.should_fail(&SimRequest::Notify(item.recipient.clone()));
        self.answer_later(
            &self.server_flight,
            SimEvent::Server {
                recipient: item.recipient.clone(),
                success,
            },
            None,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_round_trips_value() {
        let (sim, mut events) = SimulatedPeripheral::new(SimTiming::immediate()).unwrap();
        let target = AttributeTarget::Characteristic(Uuid::new_v4());

        sim.begin_write(OperationId(1), &target, &[1, 2]).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            SimEvent::Client {
                id: OperationId(1),
                success: true,
                value: None
            }
        );

        sim.begin_read(OperationId(2), &target).unwrap();
        match events.recv().await.unwrap() {
            SimEvent::Client { id, success, value } => {
                assert_eq!(id, OperationId(2));
                assert!(success);
                assert_eq!(value, Some(vec![1, 2]));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_predicate() {
        let (sim, mut events) = SimulatedPeripheral::with_failures(SimTiming::default(), |request| {
            matches!(request, SimRequest::Write(..))
        })
        .unwrap();
        let target = AttributeTarget::Characteristic(Uuid::new_v4());

        sim.begin_write(OperationId(1), &target, &[9]).unwrap();
        match events.recv().await.unwrap() {
            SimEvent::Client { success, .. } => assert!(!success),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(sim.value(target.uuid()), None);
    }

    #[test]
    fn test_route_without_receiver_drops_event() {
        SimEvent::Client {
            id: OperationId(7),
            success: true,
            value: None,
        }
        .route(None, None);
        SimEvent::Server {
            recipient: RecipientId::new("a"),
            success: false,
        }
        .route(None, None);
    }

    #[tokio::test]
    async fn test_counts_overlapping_requests() {
        let (sim, mut events) = SimulatedPeripheral::new(SimTiming {
            base_delay: Duration::from_millis(20),
            jitter: Duration::ZERO,
        })
        .unwrap();
        sim.begin_notify(&NotificationItem {
            id: crate::gatt::ItemId(1),
            batch_id: crate::gatt::BatchId(1),
            recipient: RecipientId::new("a"),
            characteristic: Uuid::new_v4(),
            payload: Arc::from(vec![1u8]),
            kind: Default::default(),
        })
        .unwrap();
        sim.begin_read(OperationId(1), &AttributeTarget::Characteristic(Uuid::new_v4()))
            .unwrap();
        sim.begin_read(OperationId(2), &AttributeTarget::Characteristic(Uuid::new_v4()))
            .unwrap();

        for _ in 0..3 {
            events.recv().await.unwrap();
        }
        assert_eq!(sim.peak_client_in_flight(), 2);
        assert_eq!(sim.peak_server_in_flight(), 1);
        assert_eq!(sim.notifications_sent(), 1);
    }
}
