//! Integration tests for the FilmMate link
//!
//! These drive complete controller sessions against the simulated radio:
//! - Device acquisition by name substring
//! - Characteristic negotiation and its failure paths
//! - The steady-state loop with the echo firmware
//! - Cancellation at every stage and the teardown it triggers

use bytes::Bytes;
use filmmate_link::locator::select_device;
use filmmate_link::negotiator::select_characteristic;
use filmmate_link::test_utils::{
    characteristic, service, LinkCall, MockCentral, MockPeripheral, FILMMATE_ADDRESS,
    FILMMATE_CHAR_UUID, FILMMATE_SERVICE_UUID,
};
use filmmate_link::{
    codec, Capability, ChannelNegotiator, CommandLoop, DeviceLocator, DiscoveredDevice,
    LinkConfig, LinkConfigBuilder, LinkError, NotificationSink, StopReason, TripodController,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Helpers
// ============================================================================

fn tripod() -> DiscoveredDevice {
    DiscoveredDevice::new(Some("FilmMate Tripod"), FILMMATE_ADDRESS)
}

fn fast_config(max_commands: u64) -> LinkConfig {
    LinkConfigBuilder::new()
        .settle_delay(Duration::from_millis(100))
        .command_interval(Duration::from_secs(1))
        .max_commands(max_commands)
        .build()
        .unwrap()
}

fn channel_sink() -> (NotificationSink, mpsc::UnboundedReceiver<i64>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = NotificationSink::new(move |value| {
        let _ = tx.send(value);
    });
    (sink, rx)
}

// ============================================================================
// Device acquisition
// ============================================================================

#[tokio::test]
async fn test_locate_by_substring() {
    let central = MockCentral::new()
        .with_advertiser(DiscoveredDevice::new(Some("Phone"), "AA:AA:AA:AA:AA:01"))
        .with_advertiser(DiscoveredDevice::new(None, "AA:AA:AA:AA:AA:02"))
        .with_advertiser(DiscoveredDevice::new(
            Some("FilmMate Tripod v2"),
            "AA:AA:AA:AA:AA:03",
        ));

    let device = DeviceLocator::new(&central)
        .discover("FilmMate Tripod", None)
        .await
        .unwrap();

    assert_eq!(device.address, "AA:AA:AA:AA:AA:03");
    assert_eq!(central.scan_count(), 1);
}

#[test]
fn test_locate_first_match_wins() {
    let devices = vec![
        DiscoveredDevice::new(Some("FilmMate Tripod A"), "01"),
        DiscoveredDevice::new(Some("FilmMate Tripod B"), "02"),
    ];
    let chosen = select_device(devices, "FilmMate Tripod").unwrap();
    assert_eq!(chosen.address, "01");
}

#[tokio::test]
async fn test_locate_is_case_sensitive() {
    let central = MockCentral::new()
        .with_advertiser(DiscoveredDevice::new(Some("filmmate tripod"), "01"));

    let err = DeviceLocator::new(&central)
        .discover("FilmMate Tripod", Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::DeviceNotFound { .. }));
}

#[tokio::test]
async fn test_device_not_found_never_connects() {
    let central = MockCentral::new()
        .with_advertiser(DiscoveredDevice::new(Some("Speaker"), "01"))
        .with_advertiser(DiscoveredDevice::new(Some("Watch"), "02"));

    let result = TripodController::new(LinkConfig::default())
        .run(&central, NotificationSink::logging(), CancellationToken::new())
        .await;

    match result {
        Err(LinkError::DeviceNotFound { target }) => assert_eq!(target, "FilmMate Tripod"),
        other => panic!("expected DeviceNotFound, got {:?}", other),
    }
    assert_eq!(central.scan_count(), 1);
    assert_eq!(central.connect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_overrunning_deadline_finds_nothing() {
    let central = MockCentral::filmmate().with_scan_delay(Duration::from_secs(60));

    let started = Instant::now();
    let err = DeviceLocator::new(&central)
        .discover("FilmMate Tripod", Some(Duration::from_secs(3)))
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::DeviceNotFound { .. }));
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(central.connect_count(), 0);
}

// ============================================================================
// Channel negotiation
// ============================================================================

#[test]
fn test_negotiation_prefers_enumeration_order() {
    let svc = Uuid::from_u128(0xA0);
    let services = vec![
        service(
            svc,
            vec![
                characteristic(svc, Uuid::from_u128(1), &[Capability::Read]),
                characteristic(svc, Uuid::from_u128(2), &[Capability::Write]),
                characteristic(svc, Uuid::from_u128(3), &[Capability::Notify]),
            ],
        ),
        service(
            FILMMATE_SERVICE_UUID,
            vec![
                characteristic(
                    FILMMATE_SERVICE_UUID,
                    FILMMATE_CHAR_UUID,
                    &[Capability::Write, Capability::Notify],
                ),
                characteristic(
                    FILMMATE_SERVICE_UUID,
                    Uuid::from_u128(5),
                    &[Capability::Read, Capability::Write, Capability::Notify],
                ),
            ],
        ),
    ];

    let chosen = select_characteristic(&services).unwrap();
    assert_eq!(chosen.uuid, FILMMATE_CHAR_UUID);
    assert_eq!(chosen.service_uuid, FILMMATE_SERVICE_UUID);
}

#[tokio::test(start_paused = true)]
async fn test_negotiation_waits_for_settle_delay() {
    let central = MockCentral::filmmate();
    let settle = Duration::from_secs(5);

    let started = Instant::now();
    let session = ChannelNegotiator::new(&central, settle)
        .negotiate(&tripod(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= settle);
    assert_eq!(session.characteristic().uuid, FILMMATE_CHAR_UUID);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_no_suitable_channel_disconnects() {
    let svc = Uuid::from_u128(0xB0);
    let central = MockCentral::new().with_device(
        tripod(),
        MockPeripheral::new(vec![service(
            svc,
            vec![
                characteristic(svc, Uuid::from_u128(1), &[Capability::Read, Capability::Notify]),
                characteristic(svc, Uuid::from_u128(2), &[Capability::WriteWithoutResponse]),
            ],
        )]),
    );

    let err = TripodController::new(fast_config(1))
        .run(&central, NotificationSink::logging(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::NoSuitableChannel { .. }));
    let link = central.link(FILMMATE_ADDRESS).unwrap();
    assert_eq!(
        link.journal(),
        vec![LinkCall::Services, LinkCall::Disconnect]
    );
    assert!(link.written().is_empty());
}

#[tokio::test]
async fn test_service_discovery_failure_disconnects() {
    let central =
        MockCentral::new().with_device(tripod(), MockPeripheral::filmmate().failing_services());

    let err = TripodController::new(fast_config(1))
        .run(&central, NotificationSink::logging(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_transport_error());
    assert_eq!(central.link(FILMMATE_ADDRESS).unwrap().disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_settle() {
    let central = MockCentral::filmmate();
    let cancel = CancellationToken::new();
    let config = LinkConfigBuilder::new()
        .settle_delay(Duration::from_secs(30))
        .build()
        .unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = TripodController::new(config)
        .run(&central, NotificationSink::logging(), cancel)
        .await
        .unwrap();

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.commands_sent, 0);
    assert!(started.elapsed() < Duration::from_secs(30));

    let link = central.link(FILMMATE_ADDRESS).unwrap();
    assert_eq!(link.journal(), vec![LinkCall::Disconnect]);
}

#[tokio::test]
async fn test_cancel_before_scan() {
    let central = MockCentral::filmmate();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = TripodController::new(LinkConfig::default())
        .run(&central, NotificationSink::logging(), cancel)
        .await
        .unwrap();

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(central.connect_count(), 0);
}

// ============================================================================
// Steady state
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_to_end_echo() {
    let central = MockCentral::filmmate();
    let (sink, mut rx) = channel_sink();
    let controller = TripodController::new(fast_config(4));

    let mut values = vec![7, 0, 100, 55].into_iter();
    let command_loop = CommandLoop::with_source(controller.config().command.clone(), move || {
        values.next().unwrap_or(0)
    });

    let report = controller
        .run_with(&central, command_loop, sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.reason, StopReason::Completed);
    assert_eq!(report.commands_sent, 4);

    let link = central.link(FILMMATE_ADDRESS).unwrap();
    let sent: Vec<i64> = link
        .written()
        .iter()
        .map(|p| codec::decode(p).unwrap())
        .collect();
    assert_eq!(sent, vec![7, 0, 100, 55]);

    let mut received = Vec::new();
    while let Ok(value) = rx.try_recv() {
        received.push(value);
    }
    // Echoes of every send but possibly the last, which races teardown.
    assert!(received.len() >= 3);
    for (got, sent) in received.iter().zip(&sent) {
        assert_eq!(*got, sent + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_wire_payloads_are_four_byte_le() {
    let central = MockCentral::filmmate();
    let controller = TripodController::new(fast_config(1));
    let command_loop =
        CommandLoop::with_source(controller.config().command.clone(), || 23);

    controller
        .run_with(&central, command_loop, NotificationSink::logging(), CancellationToken::new())
        .await
        .unwrap();

    let link = central.link(FILMMATE_ADDRESS).unwrap();
    assert_eq!(
        link.written(),
        vec![Bytes::from_static(&[0x17, 0x00, 0x00, 0x00])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_notifications_delivered() {
    let central = Arc::new(MockCentral::new().with_device(
        tripod(),
        MockPeripheral::filmmate().with_echo(false),
    ));
    let (sink, mut rx) = channel_sink();
    let cancel = CancellationToken::new();

    let task = {
        let central = Arc::clone(&central);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            TripodController::new(fast_config(u64::MAX))
                .run(central.as_ref(), sink, cancel)
                .await
        })
    };

    // Past the settle delay and the first send.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let link = central.link(FILMMATE_ADDRESS).unwrap();
    assert!(link.push_notification(Bytes::from_static(&[0x02])));
    assert!(link.push_notification(Bytes::from_static(&[0xFF, 0xFF])));
    assert!(link.push_notification(Bytes::from_static(&[0x01, 0x00, 0x00, 0x00, 0x00])));
    assert_eq!(rx.recv().await, Some(2));
    assert_eq!(rx.recv().await, Some(-1));
    assert_eq!(rx.recv().await, Some(1));

    cancel.cancel();
    let report = task.await.unwrap().unwrap();
    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.notifications_received, 3);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_order_on_cancel() {
    let central = Arc::new(MockCentral::filmmate());
    let cancel = CancellationToken::new();

    let task = {
        let central = Arc::clone(&central);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            TripodController::new(fast_config(u64::MAX))
                .run(central.as_ref(), NotificationSink::logging(), cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let cancelled_at = Instant::now();
    cancel.cancel();
    let report = task.await.unwrap().unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.commands_sent, 3);

    let link = central.link(FILMMATE_ADDRESS).unwrap();
    let journal = link.journal();
    assert_eq!(journal.first(), Some(&LinkCall::Services));
    assert_eq!(journal[1], LinkCall::Subscribe);
    assert_eq!(
        &journal[journal.len() - 2..],
        &[LinkCall::Unsubscribe, LinkCall::Disconnect]
    );
    assert_eq!(link.unsubscribe_count(), 1);
    assert_eq!(link.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_ends_session() {
    let central =
        MockCentral::new().with_device(tripod(), MockPeripheral::filmmate().failing_write_on(3));

    let err = TripodController::new(fast_config(10))
        .run(&central, NotificationSink::logging(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::WriteFailed(_)));
    let link = central.link(FILMMATE_ADDRESS).unwrap();
    assert_eq!(link.written().len(), 2);
    assert_eq!(link.unsubscribe_count(), 1);
    assert_eq!(link.disconnect_count(), 1);
    assert!(!link.is_connected());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "target_name": "FilmMate",
        "scan": { "timeout": "10s" },
        "settle_delay": "2s",
        "command": { "interval": "500ms", "max_commands": 3 }
    }"#;

    let config: LinkConfig = serde_json::from_str(json).unwrap();
    config.validate().unwrap();
    assert_eq!(config.target_name, "FilmMate");
    assert_eq!(config.scan.timeout, Some(Duration::from_secs(10)));
    assert_eq!(config.settle_delay, Duration::from_secs(2));
    assert_eq!(config.command.interval, Duration::from_millis(500));
    assert_eq!(config.command.width, 4);
    assert_eq!(config.command.max_commands, Some(3));
}

#[tokio::test]
async fn test_invalid_range_rejected_before_scanning() {
    let central = MockCentral::filmmate();
    let mut config = LinkConfig::default();
    config.command.min = 10;
    config.command.max = 5;

    let err = TripodController::new(config)
        .run(&central, NotificationSink::logging(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::InvalidConfig(_)));
    assert_eq!(central.scan_count(), 0);
    assert_eq!(central.connect_count(), 0);
}

#[tokio::test]
async fn test_zero_command_budget_never_writes() {
    let central = MockCentral::filmmate();
    let mut config = LinkConfig::default();
    config.command.max_commands = Some(0);

    let err = TripodController::new(config)
        .run(&central, NotificationSink::logging(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::InvalidConfig(_)));
    assert_eq!(central.connect_count(), 0);
    assert!(LinkConfigBuilder::new().max_commands(0).build().is_err());
}
