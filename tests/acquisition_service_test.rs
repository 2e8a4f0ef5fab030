//! Integration tests for the acquisition service.
//!
//! These drive the real scan worker thread against mock hardware and check the
//! run-level guarantees: one terminal event per run, first ready device wins,
//! ownership transfer through `accept`, and timeout behavior.

use daq_acquire::acquisition::{AcquisitionEvent, AcquisitionService, ScanOutcome};
use daq_acquire::hardware::mock::{ConnectBehavior, MockDevice, MockEnumerator, MockProvisioner};
use daq_acquire::hardware::{DeviceIdentity, RawDevice};
use daq_acquire::AcquireError;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const FAST: Duration = Duration::from_millis(20);

fn unreachable(name: &str) -> MockDevice {
    MockDevice::new(name).with_connect(ConnectBehavior::Fail("no answer".into()))
}

fn drain(rx: &mut broadcast::Receiver<AcquisitionEvent>) -> Vec<AcquisitionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn terminal_events(events: &[AcquisitionEvent]) -> Vec<&AcquisitionEvent> {
    events.iter().filter(|event| event.is_terminal()).collect()
}

// =============================================================================
// Ready path
// =============================================================================

#[test]
fn test_start_and_block_returns_ready_device() {
    let bus = MockEnumerator::new().with_device(1, MockDevice::new("DSO-6022BE"));
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);
    let mut rx = service.subscribe();

    let device = service
        .start_and_block(Some(Duration::from_secs(5)))
        .unwrap()
        .expect("device should be ready");

    assert_eq!(device.display_name(), "DSO-6022BE");
    assert!(!device.is_connected(), "handshake connection must be released");
    assert_eq!(
        service.outcome(),
        Some(&ScanOutcome::Ready {
            name: "DSO-6022BE".into(),
            identity: DeviceIdentity(1),
        })
    );

    let events = drain(&mut rx);
    assert_eq!(
        terminal_events(&events),
        vec![&AcquisitionEvent::Ready {
            name: "DSO-6022BE".into(),
            identity: DeviceIdentity(1),
        }]
    );
    assert!(matches!(
        events.last(),
        Some(AcquisitionEvent::DeviceListChanged(_))
    ));
}

#[test]
fn test_first_ready_device_in_order_wins() {
    let bus = MockEnumerator::new()
        .with_device(0xA, MockDevice::new("A"))
        .with_device(0xB, MockDevice::new("B"));
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);
    let mut rx = service.subscribe();

    let device = service.start_and_block(None).unwrap().unwrap();
    assert_eq!(device.display_name(), "A");

    let events = drain(&mut rx);
    assert_eq!(
        terminal_events(&events),
        vec![&AcquisitionEvent::Ready {
            name: "A".into(),
            identity: DeviceIdentity(0xA),
        }]
    );
    for event in &events {
        if let AcquisitionEvent::DeviceListChanged(snapshot) = event {
            assert!(snapshot.get(DeviceIdentity(0xB)).is_none());
        }
    }

    // B stayed in the pool and was never touched.
    let b = service.accept(DeviceIdentity(0xB)).unwrap();
    assert_eq!(b.connect_attempts(), 0);
}

#[test]
fn test_accept_twice_transfers_once() {
    let bus = MockEnumerator::new().with_device(7, MockDevice::new("dev"));
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);

    service.start().unwrap();
    assert_eq!(service.wait().unwrap().ready_identity(), Some(DeviceIdentity(7)));

    assert!(service.accept(DeviceIdentity(7)).is_some());
    assert!(service.accept(DeviceIdentity(7)).is_none());
    assert!(service.accept(DeviceIdentity(99)).is_none());
}

#[test]
fn test_accept_after_observing_ready_event() {
    let bus = MockEnumerator::new()
        .with_device(1, unreachable("busy"))
        .with_arrival(3, 2, MockDevice::new("late"));
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);
    let mut rx = service.subscribe();

    // Nothing terminal yet: accepting is refused rather than blocking.
    assert!(service.accept(DeviceIdentity(2)).is_none());

    service.start().unwrap();
    let identity = loop {
        match rx.blocking_recv().unwrap() {
            AcquisitionEvent::Ready { identity, .. } => break identity,
            event => assert!(!event.is_terminal(), "unexpected terminal {:?}", event),
        }
    };

    assert_eq!(identity, DeviceIdentity(2));
    let device = service.accept(identity).unwrap();
    assert_eq!(device.display_name(), "late");
    assert!(!service.is_scanning());
}

#[test]
fn test_flashed_device_becomes_ready_after_reenumeration() {
    let bus = MockEnumerator::new().with_device(5, MockDevice::new("DSO-2250").without_firmware());
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);
    let mut rx = service.subscribe();

    let device = service.start_and_block(Some(Duration::from_secs(5))).unwrap().unwrap();
    assert_eq!(device.uploads(), 1);
    assert!(!device.needs_firmware());

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        AcquisitionEvent::FirmwareUploadStarted { name: "DSO-2250".into() }
    );
    let AcquisitionEvent::DeviceListChanged(first) = &events[1] else {
        panic!("expected device list, got {:?}", events[1]);
    };
    assert!(first[0].needs_firmware());
    assert!(!first[0].is_ready());
    assert_eq!(terminal_events(&events).len(), 1);
}

// =============================================================================
// Failure paths
// =============================================================================

#[test]
fn test_firmware_failure_is_fatal() {
    let bus = MockEnumerator::new()
        .with_device(1, MockDevice::new("dev").without_firmware())
        .always_changed();
    let provisioner = MockProvisioner::failing("flash error");
    let mut service = AcquisitionService::new(bus, provisioner).with_scan_period(FAST);
    let mut rx = service.subscribe();

    let device = service.start_and_block(Some(Duration::from_secs(5))).unwrap();
    assert!(device.is_none());

    let events = drain(&mut rx);
    let failures: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, AcquisitionEvent::FirmwareUploadFailed { .. }))
        .collect();
    assert_eq!(
        failures,
        vec![&AcquisitionEvent::FirmwareUploadFailed {
            name: "dev".into(),
            message: "flash error".into(),
        }]
    );
    assert!(!events
        .iter()
        .any(|event| matches!(event, AcquisitionEvent::Ready { .. })));
    assert_eq!(terminal_events(&events).len(), 1);

    let AcquisitionEvent::DeviceListChanged(last) = events.last().unwrap() else {
        panic!("expected final device list");
    };
    assert!(last[0].needs_firmware());
    assert_eq!(last[0].last_error(), Some("flash error"));
}

#[test]
fn test_unreachable_devices_scan_until_timeout() {
    let bus = MockEnumerator::new()
        .with_device(1, unreachable("a"))
        .with_device(2, unreachable("b"))
        .with_device(3, unreachable("c"));
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);
    let mut rx = service.subscribe();

    let device = service.start_and_block(Some(Duration::from_millis(200))).unwrap();
    assert!(device.is_none());
    assert_eq!(service.outcome(), Some(&ScanOutcome::TimedOut));

    let events = drain(&mut rx);
    // The pool changed once; every later scan was a no-op.
    assert_eq!(events.len(), 2);
    let AcquisitionEvent::DeviceListChanged(snapshot) = &events[0] else {
        panic!("expected device list, got {:?}", events[0]);
    };
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().all(|record| !record.is_ready()));
    assert_eq!(events[1], AcquisitionEvent::Timeout);
}

#[test]
fn test_timeout_with_default_period() {
    let timeout = Duration::from_millis(1500);
    let bus = MockEnumerator::new().with_device(1, unreachable("dev")).always_changed();
    let mut service = AcquisitionService::new(bus, MockProvisioner::new());
    let mut rx = service.subscribe();

    let started = Instant::now();
    let device = service.start_and_block(Some(timeout)).unwrap();
    let elapsed = started.elapsed();

    assert!(device.is_none());
    assert!(
        elapsed >= timeout && elapsed < timeout + Duration::from_millis(1000),
        "returned after {:?}",
        elapsed
    );

    let events = drain(&mut rx);
    let timeouts = events
        .iter()
        .filter(|event| **event == AcquisitionEvent::Timeout)
        .count();
    assert_eq!(timeouts, 1);
    assert_eq!(terminal_events(&events).len(), 1);
}

#[test]
fn test_zero_timeout_fires_before_first_scan() {
    let bus = MockEnumerator::new().with_device(1, MockDevice::new("dev"));
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);
    let mut rx = service.subscribe();

    assert!(service.start_and_block(Some(Duration::ZERO)).unwrap().is_none());
    assert_eq!(drain(&mut rx), vec![AcquisitionEvent::Timeout]);
}

#[test]
fn test_unrepresentable_period_still_times_out() {
    let bus = MockEnumerator::new().with_device(1, MockDevice::new("dev"));
    let mut service =
        AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(Duration::MAX);
    service.set_timeout(Some(Duration::from_millis(50))).unwrap();
    let mut rx = service.subscribe();

    service.start().unwrap();
    assert_eq!(service.wait().unwrap(), ScanOutcome::TimedOut);
    assert_eq!(drain(&mut rx), vec![AcquisitionEvent::Timeout]);

    // The pool survived the run; the device was never scanned.
    let device = service.accept(DeviceIdentity(1)).unwrap();
    assert_eq!(device.connect_attempts(), 0);
}

#[test]
fn test_timeout_does_not_abort_upload() {
    let bus = MockEnumerator::new().with_device(1, MockDevice::new("dev").without_firmware());
    let provisioner = MockProvisioner::new().with_upload_time(Duration::from_millis(300));
    let mut service = AcquisitionService::new(bus, provisioner).with_scan_period(FAST);
    let mut rx = service.subscribe();

    assert!(service
        .start_and_block(Some(Duration::from_millis(100)))
        .unwrap()
        .is_none());

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        AcquisitionEvent::FirmwareUploadStarted { name: "dev".into() }
    );
    assert!(matches!(events[1], AcquisitionEvent::DeviceListChanged(_)));
    assert_eq!(events[2], AcquisitionEvent::Timeout);

    // The interrupted run still completed the upload it had started.
    let device = service.accept(DeviceIdentity(1)).unwrap();
    assert_eq!(device.uploads(), 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_timeout_configuration() {
    let mut service = AcquisitionService::new(MockEnumerator::new(), MockProvisioner::new())
        .with_scan_period(FAST);
    assert_eq!(service.timeout(), None);

    service.set_timeout(Some(Duration::from_millis(50))).unwrap();
    assert_eq!(service.timeout(), Some(Duration::from_millis(50)));

    service.start().unwrap();
    assert!(matches!(
        service.set_timeout(None),
        Err(AcquireError::Busy)
    ));

    assert_eq!(service.wait().unwrap(), ScanOutcome::TimedOut);
    assert!(matches!(
        service.set_timeout(None),
        Err(AcquireError::AlreadyRan)
    ));
}

#[test]
fn test_restart_is_rejected() {
    let mut service = AcquisitionService::new(MockEnumerator::new(), MockProvisioner::new())
        .with_scan_period(FAST);
    service.start_and_block(Some(Duration::from_millis(30))).unwrap();

    assert!(matches!(service.start(), Err(AcquireError::AlreadyRan)));
    assert!(matches!(
        service.start_and_block(None),
        Err(AcquireError::AlreadyRan)
    ));
}

#[test]
fn test_wait_before_start() {
    let mut service = AcquisitionService::new(MockEnumerator::new(), MockProvisioner::new());
    assert!(matches!(service.wait(), Err(AcquireError::NotStarted)));
}

#[test]
fn test_zero_period_rejected() {
    let mut service = AcquisitionService::new(MockEnumerator::new(), MockProvisioner::new())
        .with_scan_period(Duration::ZERO);
    assert!(matches!(
        service.start(),
        Err(AcquireError::Configuration(_))
    ));
    assert!(!service.is_scanning());
}

#[test]
fn test_start_is_idempotent_while_scanning() {
    let bus = MockEnumerator::new().with_arrival(2, 1, MockDevice::new("dev"));
    let mut service = AcquisitionService::new(bus, MockProvisioner::new()).with_scan_period(FAST);

    service.start().unwrap();
    service.start().unwrap();
    assert_eq!(service.wait().unwrap().ready_identity(), Some(DeviceIdentity(1)));
}
