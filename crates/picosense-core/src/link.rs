//! Link adapter abstraction over the Bluetooth stack.
//!
//! The [`LinkAdapter`] trait is the only way the session touches the radio.
//! [`BtleplugLink`](crate::btle::BtleplugLink) implements it on top of
//! btleplug; [`MockLink`](crate::mock::MockLink) implements it in memory so
//! the session can be exercised without hardware.
//!
//! Long-lived outcomes (discoveries, connection state, notifications) are
//! delivered as streams. The session runs every call on its own task and
//! turns returned errors into events, so a failing adapter never unwinds
//! into the state machine.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use picosense_types::{CharacteristicKind, PeripheralIdentity};

use crate::error::Result;

/// Power state of the local Bluetooth radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// State not yet reported.
    #[default]
    Unknown,
    /// Radio is on and can scan.
    PoweredOn,
    /// Radio is off or unavailable.
    PoweredOff,
}

impl RadioState {
    /// Whether the radio can be used.
    pub fn is_ready(&self) -> bool {
        matches!(self, RadioState::PoweredOn)
    }
}

/// A peripheral seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    /// Identity to connect to.
    pub identity: PeripheralIdentity,
    /// Service UUIDs in the advertisement.
    pub services: Vec<Uuid>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

/// Connection lifecycle events for one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The link is up.
    Connected,
    /// The attempt failed; no `Disconnected` follows.
    ConnectionFailed(String),
    /// The link dropped.
    Disconnected,
}

/// Reference to a characteristic on a connected peripheral.
///
/// Only valid while the peripheral it was resolved on stays connected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicHandle {
    /// Identifier of the owning peripheral.
    pub peripheral: String,
    /// Service the characteristic belongs to.
    pub service: Uuid,
    /// Characteristic UUID.
    pub uuid: Uuid,
}

impl CharacteristicHandle {
    /// Create a handle.
    pub fn new(peripheral: impl Into<String>, service: Uuid, uuid: Uuid) -> Self {
        Self {
            peripheral: peripheral.into(),
            service,
            uuid,
        }
    }

    /// Which sensor characteristic this handle refers to, if any.
    pub fn kind(&self) -> Option<CharacteristicKind> {
        CharacteristicKind::from_uuid(&self.uuid)
    }
}

impl fmt::Display for CharacteristicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peripheral, self.uuid)
    }
}

/// Result of service and characteristic discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GattInventory {
    /// Requested services found on the peripheral.
    pub services: Vec<Uuid>,
    /// Requested characteristics found within those services.
    pub characteristics: Vec<CharacteristicHandle>,
}

/// Whether a write waits for the peripheral's acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Write without response.
    FireAndForget,
    /// Write with response.
    AwaitAck,
}

/// Capability interface the session uses to drive the radio.
#[async_trait]
pub trait LinkAdapter: Send + Sync + 'static {
    /// The current radio state followed by every change.
    async fn radio_states(&self) -> BoxStream<'static, RadioState>;

    /// Start scanning for peripherals advertising any of `services`.
    ///
    /// The stream does not end on its own; calling this again restarts the
    /// scan.
    async fn start_discovery(
        &self,
        services: &[Uuid],
    ) -> Result<BoxStream<'static, DiscoveredPeripheral>>;

    /// Stop scanning.
    async fn stop_discovery(&self) -> Result<()>;

    /// Connect to a discovered peripheral.
    ///
    /// The stream yields `Connected` or `ConnectionFailed`, then
    /// `Disconnected` once the link drops.
    async fn connect(&self, peripheral: &PeripheralIdentity) -> BoxStream<'static, ConnectionEvent>;

    /// Resolve the requested services and characteristics.
    async fn discover(
        &self,
        peripheral: &PeripheralIdentity,
        services: &[Uuid],
        characteristics: &[Uuid],
    ) -> Result<GattInventory>;

    /// Enable notifications and stream the raw values.
    async fn subscribe(&self, handle: &CharacteristicHandle) -> Result<BoxStream<'static, Vec<u8>>>;

    /// Read the current value.
    async fn read(&self, handle: &CharacteristicHandle) -> Result<Vec<u8>>;

    /// Write a value.
    async fn write(&self, handle: &CharacteristicHandle, data: &[u8], ack: AckPolicy)
    -> Result<()>;

    /// Drop the link to a peripheral.
    async fn disconnect(&self, peripheral: &PeripheralIdentity) -> Result<()>;
}
