//! Unit tests for QuickBLE public building blocks

use quickble::gatt::{
    AttributeKind, AttributeTarget, BatchId, NotificationBatch, NotifyKind, Operation,
    OperationVerb, RecipientId, CCCD_UUID,
};
use quickble::queue::{SequencerPhase, SequencerQueue};
use quickble::{DisconnectedPolicy, QuickBleConfig};
use uuid::Uuid;

#[test]
fn test_operation_ids_are_unique_and_increasing() {
    let target = AttributeTarget::Characteristic(Uuid::new_v4());
    let first = Operation::read(target);
    let second = Operation::write(target, vec![1]);
    assert!(second.id > first.id);
    assert_eq!(first.verb, OperationVerb::Read);
    assert_eq!(first.payload, None);
    assert_eq!(second.payload, Some(vec![1]));
}

#[test]
fn test_descriptor_target() {
    let characteristic = Uuid::new_v4();
    let target = AttributeTarget::Descriptor {
        characteristic,
        descriptor: CCCD_UUID,
    };
    assert_eq!(target.kind(), AttributeKind::Descriptor);
    assert_eq!(target.uuid(), CCCD_UUID);
}

#[test]
fn test_recipient_addresses_normalize() {
    assert_eq!(RecipientId::new(" aa:bb:cc "), RecipientId::from("AA:BB:CC"));
}

#[test]
fn test_batch_items_share_payload() {
    let batch = NotificationBatch::new(
        Uuid::new_v4(),
        vec![1, 2, 3],
        vec![RecipientId::new("a"), RecipientId::new("b")],
        NotifyKind::Indication,
    );
    let items = batch.items();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.batch_id == batch.id));
    assert!(items.iter().all(|item| &*item.payload == &[1, 2, 3]));
    assert_eq!(items[0].recipient.as_str(), "A");
    assert_ne!(items[0].id, items[1].id);
    let empty =
        NotificationBatch::new(Uuid::new_v4(), Vec::<u8>::new(), vec![], NotifyKind::default());
    assert!(empty.items().is_empty());
    assert_ne!(batch.id, BatchId(0));
}

#[test]
fn test_queue_single_flight_cycle() {
    let target = AttributeTarget::Characteristic(Uuid::new_v4());
    let mut queue = SequencerQueue::new();

    let a = queue.push(Operation::read(target)).expect("idle queue dispatches head");
    assert!(queue.push(Operation::read(target)).is_none());
    assert_eq!(queue.phase(), SequencerPhase::Dispatching);

    // Nothing handed off yet: completions are stale
    assert!(queue.current().is_none());
    assert!(queue.complete_current(true).is_none());

    assert!(queue.claim(a.id));
    assert!(!queue.claim(a.id));
    assert_eq!(queue.current().map(|op| op.id), Some(a.id));

    let done = queue.complete(a.id, true).unwrap();
    assert_eq!(done.unit.id, a.id);
    let b = done.next.expect("second operation follows");
    assert!(queue.complete(a.id, true).is_none());

    assert!(queue.claim(b.id));
    let done = queue.complete_current(false).unwrap();
    assert!(done.next.is_none());
    assert_eq!(queue.phase(), SequencerPhase::Idle);

    let metrics = queue.metrics();
    assert_eq!(metrics.dispatched_total, 2);
    assert_eq!(metrics.completed_total, 1);
    assert_eq!(metrics.failed_total, 1);
}

#[test]
fn test_queue_flush_blocks_claim() {
    let target = AttributeTarget::Characteristic(Uuid::new_v4());
    let mut queue = SequencerQueue::new();
    let head = queue.push(Operation::read(target)).unwrap();
    queue.push(Operation::read(target));

    let flushed = queue.begin_flush();
    assert_eq!(queue.phase(), SequencerPhase::Flushing);
    queue.end_flush();
    assert_eq!(flushed.len(), 2);
    assert_eq!(flushed[0].id, head.id);

    // A dispatch scheduled before the flush must not reach the transport
    assert!(!queue.claim(head.id));
    assert!(queue.is_empty());
    assert_eq!(queue.metrics().flushed_total, 2);
}

#[test]
fn test_config_round_trip_through_json() {
    let mut config = QuickBleConfig::default();
    config.client.disconnected_enqueue = DisconnectedPolicy::Drop;
    config.server.notify_changing_device = true;
    config.logging.log_level = Some("warn".to_string());

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"drop\""));
    assert_eq!(QuickBleConfig::from_json(&json).unwrap(), config);
}
