//! Sequencer throughput benchmarks for QuickBLE

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quickble::gatt::{AttributeTarget, NotificationBatch, NotifyKind, Operation, RecipientId};
use quickble::queue::SequencerQueue;
use quickble::sim::{SimTiming, SimulatedPeripheral};
use quickble::{
    BatchReport, ClientConfig, NotificationFanout, OperationCompletion, OperationSequencer,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

fn benchmark_queue_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_cycle");
    let target = AttributeTarget::Characteristic(Uuid::new_v4());

    for depth in [1usize, 16, 256].iter() {
        group.bench_with_input(BenchmarkId::new("push_claim_complete", depth), depth, |b, &depth| {
            b.iter(|| {
                let mut queue = SequencerQueue::new();
                let mut head = None;
                for _ in 0..depth {
                    if let Some(first) = queue.push(Operation::read(target)) {
                        head = Some(first);
                    }
                }
                while let Some(op) = head.take() {
                    queue.claim(op.id);
                    head = queue.complete(op.id, true).and_then(|done| done.next);
                }
                black_box(queue.metrics())
            })
        });
    }
    group.finish();
}

fn benchmark_client_round_trips(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("client_round_trips");
    group.sample_size(20);

    for count in [10usize, 100].iter() {
        group.bench_with_input(BenchmarkId::new("sim_reads", count), count, |b, &count| {
            b.iter(|| {
                rt.block_on(async {
                    let (sim, mut events) =
                        SimulatedPeripheral::new(SimTiming::immediate()).unwrap();
                    let (done_tx, mut done) = mpsc::unbounded_channel::<OperationCompletion>();
                    let sequencer = OperationSequencer::new(
                        sim,
                        Arc::new(move |c: OperationCompletion| {
                            let _ = done_tx.send(c);
                        }),
                        ClientConfig::default(),
                    )
                    .unwrap();

                    let target = AttributeTarget::Characteristic(Uuid::new_v4());
                    for _ in 0..count {
                        sequencer.enqueue(Operation::read(target));
                    }
                    for _ in 0..count {
                        let event = events.recv().await.unwrap();
                        event.route(Some(&sequencer), None);
                        black_box(done.recv().await.unwrap());
                    }
                })
            })
        });
    }
    group.finish();
}

fn benchmark_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("notification_fanout");
    group.sample_size(20);

    for recipients in [1usize, 8, 32].iter() {
        let id = BenchmarkId::new("one_batch", recipients);
        group.bench_with_input(id, recipients, |b, &recipients| {
            let devices: Vec<RecipientId> = (0..recipients)
                .map(|i| RecipientId::new(format!("device_{}", i)))
                .collect();
            b.iter(|| {
                rt.block_on(async {
                    let (sim, mut events) =
                        SimulatedPeripheral::new(SimTiming::immediate()).unwrap();
                    let (done_tx, mut done) = mpsc::unbounded_channel::<BatchReport>();
                    let fanout = NotificationFanout::new(
                        sim,
                        Arc::new(move |r: BatchReport| {
                            let _ = done_tx.send(r);
                        }),
                    )
                    .unwrap();

                    fanout.queue_batch(NotificationBatch::new(
                        Uuid::new_v4(),
                        vec![0u8; 20],
                        devices.clone(),
                        NotifyKind::Notification,
                    ));
                    for _ in 0..recipients {
                        events.recv().await.unwrap().route(None, Some(&fanout));
                    }
                    black_box(done.recv().await.unwrap())
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_queue_cycle,
    benchmark_client_round_trips,
    benchmark_fanout
);
criterion_main!(benches);
