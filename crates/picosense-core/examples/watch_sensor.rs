//! Example: Watching the Sensor Board
//!
//! This example connects to the first board in range and prints every
//! snapshot the session publishes. Pass a relay index to toggle that relay
//! once the board is streaming.
//!
//! Run with: `cargo run --example watch_sensor -- [RELAY_INDEX]`

use std::env;
use std::sync::Arc;

use picosense_core::{BtleplugLink, Session, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let toggle: Option<usize> = env::args().nth(1).map(|arg| arg.parse()).transpose()?;

    let link = Arc::new(BtleplugLink::new().await?);
    let session = Session::spawn(link, SessionConfig::default())?;
    let mut observer = session.observer();

    println!("Waiting for a board...");
    let snapshot = observer
        .wait_for(|s| s.is_streaming() && !s.relays.is_empty())
        .await?;
    println!(
        "Connected to {}",
        snapshot.peripheral_name.as_deref().unwrap_or("unnamed board")
    );

    if let Some(index) = toggle {
        let on = !snapshot.relays.get(index).copied().unwrap_or(false);
        println!("Switching relay {} {}", index, if on { "on" } else { "off" });
        session.set_relay(index, on).await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = observer.changed() => {
                let snapshot = changed?;
                println!(
                    "[{}] temperature={:?} humidity={:?} relays={:?}",
                    snapshot.phase, snapshot.temperature, snapshot.humidity, snapshot.relays
                );
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
