//! QuickBLE demonstration
//!
//! Drives a client sequencer and a server fan-out against the simulated
//! peripheral, printing the order in which work is issued and completed.

use quickble::gatt::CCCD_UUID;
use quickble::sim::{SimRequest, SimTiming, SimulatedPeripheral};
use quickble::{
    parse_uuid, AttributeTarget, BatchReport, GattClient, GattServer, NotifyKind,
    OperationCompletion, QuickBleConfig, RecipientId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        #[cfg(feature = "config-file")]
        Some(path) => QuickBleConfig::load(path)?,
        #[cfg(not(feature = "config-file"))]
        Some(_) => QuickBleConfig::default(),
        None => QuickBleConfig::default(),
    };
    quickble::init(&config)?;

    info!("🚀 Starting QuickBLE demonstration...");

    info!("\n📝 Example 1: Client operations against a simulated peripheral");
    if let Err(e) = client_demo(&config).await {
        error!("❌ Client demo failed: {}", e);
    }

    info!("\n📡 Example 2: Notification fan-out to simulated centrals");
    if let Err(e) = server_demo(&config).await {
        error!("❌ Server demo failed: {}", e);
    }

    info!("\n🎉 QuickBLE demonstration completed!");
    Ok(())
}

async fn client_demo(config: &QuickBleConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (sim, mut events) = SimulatedPeripheral::new(SimTiming::default())?;
    let (done_tx, mut done) = mpsc::unbounded_channel::<OperationCompletion>();

    let client = Arc::new(GattClient::new(
        sim.clone(),
        Arc::new(move |completion: OperationCompletion| {
            let _ = done_tx.send(completion);
        }),
        config.client.clone(),
    )?);

    // Platform callback thread stand-in
    let sequencer = client.sequencer().clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            event.route(Some(&sequencer), None);
        }
    });

    // Battery level, heart rate measurement and a vendor characteristic
    let (a, b, c) = (parse_uuid("2A19")?, parse_uuid("2A37")?, Uuid::new_v4());
    for characteristic in [a, b, c] {
        client.register_characteristic(characteristic);
    }
    client.register_descriptor(c, CCCD_UUID);
    sim.set_value(a, b"hello".to_vec());

    // Bridges hand attributes over as strings
    client.read("2a19".parse::<AttributeTarget>()?);
    client.write_characteristic(b, vec![1, 2, 3]);
    client.read_characteristic(c);
    client.subscribe(c, true);
    // Never discovered: fails without reaching the peripheral
    client.read_characteristic(Uuid::new_v4());

    for _ in 0..5 {
        let Some(completion) = tokio::time::timeout(Duration::from_secs(2), done.recv()).await?
        else {
            break;
        };
        info!(
            "  {} {:?} {} -> success: {}, value: {}",
            completion.id,
            completion.verb,
            completion.target,
            completion.success,
            completion.value.as_deref().map(hex::encode).unwrap_or_default()
        );
    }

    info!(
        "  Peak requests in flight: {} (of {} sent)",
        sim.peak_client_in_flight(),
        sim.client_requests()
    );
    info!("  Metrics: {}", serde_json::to_string(&client.metrics())?);
    Ok(())
}

async fn server_demo(config: &QuickBleConfig) -> Result<(), Box<dyn std::error::Error>> {
    // d3 is out of range: every notification to it fails
    let unreachable = RecipientId::new("d3");
    let (sim, mut events) =
        SimulatedPeripheral::with_failures(SimTiming::default(), move |request| {
            matches!(request, SimRequest::Notify(recipient) if *recipient == unreachable)
        })?;
    let (done_tx, mut done) = mpsc::unbounded_channel::<BatchReport>();

    let server = GattServer::new(
        sim.clone(),
        Arc::new(move |report: BatchReport| {
            let _ = done_tx.send(report);
        }),
        config.server.clone(),
    )?;

    let fanout = server.fanout().clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            event.route(None, Some(&fanout));
        }
    });

    let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
    server.add_characteristic(x, Vec::<u8>::new(), NotifyKind::Notification);
    server.add_characteristic(y, Vec::<u8>::new(), NotifyKind::Indication);
    for device in ["d1", "d2", "d3"] {
        server.device_connected(RecipientId::new(device));
    }

    server.write_characteristic(x, vec![0x2a], true);
    server.notify_device(y, &RecipientId::new("d1"));
    server.handle_remote_write(&RecipientId::new("d2"), y, vec![0x07])?;
    let value =
        server.handle_remote_read(&RecipientId::new("d1"), &AttributeTarget::Characteristic(y))?;
    info!("  d1 read {} = {}", y, hex::encode(value));

    for _ in 0..3 {
        let Some(report) = tokio::time::timeout(Duration::from_secs(2), done.recv()).await?
        else {
            break;
        };
        info!(
            "  {} on {} -> success: {} ({}/{} failed)",
            report.batch_id,
            report.characteristic,
            report.success,
            report.error_count,
            report.recipient_count
        );
    }

    server.stop();
    info!(
        "  Peak notifications in flight: {} (of {} sent)",
        sim.peak_server_in_flight(),
        sim.notifications_sent()
    );
    Ok(())
}
