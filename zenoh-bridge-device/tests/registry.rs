//! Connection registry lifecycle.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use zenoh_bridge_device::invoker::MethodInvoker;
use zenoh_bridge_device::method::MethodArgs;
use zenoh_bridge_device::polling::PollingManager;
use zenoh_bridge_device::{ConnectOutcome, ConnectionKey, GatewayError};

use common::{FakeDevice, registry, tcp};

#[tokio::test]
async fn test_connect_registers_connection() {
    let device = FakeDevice::new();
    let registry = registry(&device);

    let outcome = registry.connect(tcp("10.0.0.5", 1)).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert_eq!(registry.list(), vec![ConnectionKey::new("10.0.0.5", 1)]);

    let connection = registry
        .connection(&ConnectionKey::new("10.0.0.5", 1))
        .unwrap();
    assert!(connection.is_connected());
}

#[tokio::test]
async fn test_connect_twice_keeps_single_entry() {
    let device = FakeDevice::new();
    let registry = registry(&device);

    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();
    let outcome = registry.connect(tcp("10.0.0.5", 1)).await.unwrap();

    assert_eq!(outcome, ConnectOutcome::AlreadyConnected);
    assert_eq!(registry.len(), 1);
    assert_eq!(device.opens(), 1);
}

#[tokio::test]
async fn test_same_address_different_unit_is_separate() {
    let device = FakeDevice::new();
    let registry = registry(&device);

    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();
    registry.connect(tcp("10.0.0.5", 2)).await.unwrap();

    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_connect_failure_registers_nothing() {
    let device = FakeDevice::new();
    device.fail_open.store(true, Ordering::SeqCst);
    let registry = registry(&device);

    let err = registry.connect(tcp("10.0.0.9", 1)).await.unwrap_err();
    assert_eq!(err.to_string(), "Connection refused");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_disconnect_unknown_is_not_connected() {
    let device = FakeDevice::new();
    let registry = registry(&device);
    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();

    let err = registry.disconnect("10.0.0.6", 1).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected));
    assert_eq!(registry.list(), vec![ConnectionKey::new("10.0.0.5", 1)]);
    assert_eq!(device.closes(), 0);
}

#[tokio::test]
async fn test_disconnect_removes_connection() {
    let device = FakeDevice::new();
    let registry = registry(&device);
    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();

    registry.disconnect("10.0.0.5", 1).await.unwrap();

    assert!(registry.is_empty());
    assert_eq!(device.closes(), 1);

    // Second disconnect has nothing to close
    let err = registry.disconnect("10.0.0.5", 1).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected));
}

#[tokio::test]
async fn test_close_failure_keeps_entry() {
    let device = FakeDevice::new();
    let registry = registry(&device);
    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();
    device.fail_close.store(true, Ordering::SeqCst);

    let err = registry.disconnect("10.0.0.5", 1).await.unwrap_err();
    assert_eq!(err.to_string(), "Port busy");

    let connection = registry
        .connection(&ConnectionKey::new("10.0.0.5", 1))
        .unwrap();
    assert!(connection.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_polls() {
    let device = FakeDevice::new();
    let registry = registry(&device);
    let polling = PollingManager::new(registry.clone());
    let key = ConnectionKey::new("10.0.0.5", 1);

    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();
    polling
        .set_interval(
            &key,
            "readHoldingRegisters",
            0,
            Duration::from_millis(100),
            MethodArgs::read(2),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;
    registry.disconnect("10.0.0.5", 1).await.unwrap();
    let calls = device.calls();
    assert_eq!(calls, 3);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(device.calls(), calls);
    assert!(polling.list_intervals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_everything() {
    let device = FakeDevice::new();
    let registry = registry(&device);
    let polling = PollingManager::new(registry.clone());

    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();
    registry.connect(tcp("10.0.0.6", 1)).await.unwrap();
    polling
        .set_interval(
            &ConnectionKey::new("10.0.0.6", 1),
            "readCoils",
            0,
            Duration::from_millis(100),
            MethodArgs::read(1),
        )
        .unwrap();

    registry.shutdown().await;

    assert!(registry.is_empty());
    assert_eq!(device.closes(), 2);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(device.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_device_does_not_block_other_devices() {
    let device = FakeDevice::new();
    let registry = registry(&device);
    let stalled = ConnectionKey::new("10.0.0.5", 1);

    registry.connect(tcp("10.0.0.5", 1)).await.unwrap();
    device.stall.store(true, Ordering::SeqCst);

    let invoker = MethodInvoker::new(registry.clone());
    let read = tokio::spawn({
        let key = stalled.clone();
        async move {
            invoker
                .invoke(&key, "readHoldingRegisters", 0, &MethodArgs::read(1))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let disconnect = tokio::spawn({
        let registry = registry.clone();
        async move { registry.disconnect("10.0.0.5", 1).await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Another device connects and disconnects while the first one is stuck
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        registry.connect(tcp("10.0.0.9", 1)),
    )
    .await
    .expect("connect of another device must not wait")
    .unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    tokio::time::timeout(Duration::from_millis(100), registry.disconnect("10.0.0.9", 1))
        .await
        .expect("disconnect of another device must not wait")
        .unwrap();

    // The stuck disconnect gives up and keeps the entry
    let err = disconnect.await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "Request timeout");
    assert!(registry.connection(&stalled).is_ok());

    tokio::time::timeout(Duration::from_secs(60), registry.shutdown())
        .await
        .expect("shutdown must finish");
    assert!(registry.is_empty());
    assert_eq!(device.closes(), 1);

    read.abort();
}
