//! Hardware integration tests for picosense-core
//!
//! These tests require a powered board in range and should be run with:
//! ```
//! cargo test --package picosense-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the board via environment variables:
//! - `PICOSENSE_RELAY_COUNT`: number of relays on the board (default 2)
//! - `PICOSENSE_TOGGLE_RELAY`: set to `1` to allow the relay test to switch
//!   relay 0 on and back off
//!
//! Example:
//! ```
//! PICOSENSE_TOGGLE_RELAY=1 cargo test --package picosense-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use picosense_core::{BtleplugLink, LinkAdapter, Session, SessionConfig, uuids};
use tokio::time::timeout;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn relay_count() -> usize {
    env::var("PICOSENSE_RELAY_COUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2)
}

fn relay_toggle_enabled() -> bool {
    env::var("PICOSENSE_TOGGLE_RELAY").is_ok_and(|v| v == "1")
}

// =============================================================================
// Scan Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_board() {
    let link = BtleplugLink::new().await.expect("no Bluetooth adapter");
    let mut scan = link
        .start_discovery(&uuids::REQUIRED_SERVICES)
        .await
        .expect("scan failed to start");

    let found = timeout(BLE_TIMEOUT, scan.next())
        .await
        .expect("no board found within timeout")
        .expect("scan ended");
    println!("Found {} (rssi {:?})", found.identity, found.rssi);
    assert!(
        found
            .services
            .contains(&uuids::ENVIRONMENTAL_SENSING_SERVICE)
    );

    link.stop_discovery().await.expect("scan failed to stop");
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_session_streams_readings() {
    let link = Arc::new(BtleplugLink::new().await.expect("no Bluetooth adapter"));
    let config = SessionConfig::default().relay_count(relay_count());
    let session = Session::spawn(link, config).expect("invalid config");

    let snapshot = timeout(
        BLE_TIMEOUT,
        session
            .observer()
            .wait_for(|s| s.is_streaming() && s.temperature.is_some() && s.humidity.is_some()),
    )
    .await
    .expect("board did not stream within timeout")
    .expect("session closed");

    println!("Temperature: {:?} °C", snapshot.temperature);
    println!("Humidity: {:?} %", snapshot.humidity);
    println!("Relays: {:?}", snapshot.relays);
    assert!(snapshot.is_connected);

    session.shutdown().await;
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_relay_toggle_round_trip() {
    if !relay_toggle_enabled() {
        println!("Skipping: set PICOSENSE_TOGGLE_RELAY=1 to switch relays");
        return;
    }

    let link = Arc::new(BtleplugLink::new().await.expect("no Bluetooth adapter"));
    let config = SessionConfig::default().relay_count(relay_count());
    let session = Session::spawn(link, config).expect("invalid config");
    let mut observer = session.observer();

    let initial = timeout(
        BLE_TIMEOUT,
        observer.wait_for(|s| s.is_streaming() && !s.relays.is_empty()),
    )
    .await
    .expect("relay characteristic not bound within timeout")
    .expect("session closed");
    let was_on = initial.relays[0];

    session.set_relay(0, !was_on).await.expect("session closed");
    timeout(
        BLE_TIMEOUT,
        observer.wait_for(|s| s.relays.first().is_some_and(|&on| on != was_on)),
    )
    .await
    .expect("relay did not change")
    .expect("session closed");

    session.set_relay(0, was_on).await.expect("session closed");
    timeout(BLE_TIMEOUT, observer.wait_for(|s| s.relays.first() == Some(&was_on)))
        .await
        .expect("relay did not restore")
        .expect("session closed");

    session.shutdown().await;
}
