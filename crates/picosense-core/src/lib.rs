//! BLE client for the Pi Pico environmental sensor and relay board.
//!
//! The board exposes temperature and humidity as notifying characteristics
//! of the Environmental Sensing service, plus a vendor characteristic that
//! holds the relay bank as a packed bit vector. This crate finds the board,
//! keeps a session with it alive, publishes what it reports and forwards
//! relay commands.
//!
//! # Architecture
//!
//! - [`SessionMachine`]: the pure connection state machine
//! - [`Session`]: the actor that drives the machine against a [`LinkAdapter`]
//! - [`StateObserver`]: read side of the published [`SessionSnapshot`]s
//! - [`BtleplugLink`]: the btleplug-backed adapter
//! - [`MockLink`]: an in-memory adapter for tests
//!
//! # Platform Differences
//!
//! Peripherals are identified by their Bluetooth MAC address on Linux and
//! Windows, and by a CoreBluetooth UUID on macOS. The macOS UUID is stable
//! for a given board on a given Mac but differs between machines.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use picosense_core::{BtleplugLink, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = Arc::new(BtleplugLink::new().await?);
//!     let session = Session::spawn(link, SessionConfig::default())?;
//!
//!     let mut observer = session.observer();
//!     let snapshot = observer.wait_for(|s| s.temperature.is_some()).await?;
//!     println!("Temperature: {:.2} °C", snapshot.temperature.unwrap_or_default());
//!
//!     session.set_relay(0, true).await?;
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod config;
pub mod error;
pub mod events;
pub mod link;
pub mod machine;
pub mod mock;
pub mod session;
pub mod sink;
pub mod state;
pub mod util;

// Core exports
pub use btle::{BtleplugLink, get_adapter};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, IgnoreReason, SessionDiagnostic};
pub use link::{
    AckPolicy, CharacteristicHandle, ConnectionEvent, DiscoveredPeripheral, GattInventory,
    LinkAdapter, RadioState,
};
pub use machine::{Action, SessionEvent, SessionMachine, Step};
pub use mock::{MockLink, WriteRecord};
pub use session::{Session, SessionHandle};
pub use sink::{StateObserver, StateSink};
pub use state::{CharacteristicSet, ConnectionPhase, SessionSnapshot};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from picosense-types
pub use picosense_types::uuids;
pub use picosense_types::{CharacteristicKind, PeripheralIdentity, RelayVector, SensorReading};
