//! Session state as seen by observers.

use std::fmt;

use serde::{Deserialize, Serialize};

use picosense_types::CharacteristicKind;

use crate::link::CharacteristicHandle;

/// Lifecycle phase of the peripheral session.
///
/// The session starts in `Idle` and never terminates; every disconnect or
/// failure leads back to `Scanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Waiting for the radio to power on.
    #[default]
    Idle,
    /// Looking for a peripheral.
    Scanning,
    /// Connect issued, waiting for the link.
    Connecting,
    /// Resolving the environmental sensing service.
    DiscoveringServices,
    /// Resolving the sensor and relay characteristics.
    DiscoveringCharacteristics,
    /// Notifications requested.
    Subscribing,
    /// Values are flowing.
    Streaming,
    /// Tearing down after the link dropped.
    Disconnecting,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Scanning => "scanning",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::DiscoveringServices => "discovering services",
            ConnectionPhase::DiscoveringCharacteristics => "discovering characteristics",
            ConnectionPhase::Subscribing => "subscribing",
            ConnectionPhase::Streaming => "streaming",
            ConnectionPhase::Disconnecting => "disconnecting",
        };
        f.write_str(label)
    }
}

/// One optional handle per sensor characteristic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicSet {
    pub temperature: Option<CharacteristicHandle>,
    pub humidity: Option<CharacteristicHandle>,
    pub relay: Option<CharacteristicHandle>,
}

impl CharacteristicSet {
    /// The handle bound for `kind`.
    pub fn get(&self, kind: CharacteristicKind) -> Option<&CharacteristicHandle> {
        match kind {
            CharacteristicKind::Temperature => self.temperature.as_ref(),
            CharacteristicKind::Humidity => self.humidity.as_ref(),
            CharacteristicKind::Relay => self.relay.as_ref(),
        }
    }

    /// Bind `handle` for `kind`, replacing any previous binding.
    pub fn set(&mut self, kind: CharacteristicKind, handle: CharacteristicHandle) {
        *self.slot(kind) = Some(handle);
    }

    /// Remove the binding for `kind`.
    pub fn clear(&mut self, kind: CharacteristicKind) -> Option<CharacteristicHandle> {
        self.slot(kind).take()
    }

    /// Whether no handle is bound.
    pub fn is_empty(&self) -> bool {
        CharacteristicKind::ALL
            .into_iter()
            .all(|kind| self.get(kind).is_none())
    }

    /// Kinds with no handle bound.
    pub fn missing(&self) -> Vec<CharacteristicKind> {
        CharacteristicKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_none())
            .collect()
    }

    /// Bound handles in subscription order.
    pub fn handles(&self) -> impl Iterator<Item = &CharacteristicHandle> {
        CharacteristicKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind))
    }

    fn slot(&mut self, kind: CharacteristicKind) -> &mut Option<CharacteristicHandle> {
        match kind {
            CharacteristicKind::Temperature => &mut self.temperature,
            CharacteristicKind::Humidity => &mut self.humidity,
            CharacteristicKind::Relay => &mut self.relay,
        }
    }
}

/// The published view of the session.
///
/// Snapshots are built from a complete state transition, so `is_connected`
/// is never `false` while handles or readings are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current lifecycle phase.
    pub phase: ConnectionPhase,
    /// Whether a link to the peripheral is up.
    pub is_connected: bool,
    /// Advertised name of the selected peripheral.
    pub peripheral_name: Option<String>,
    /// Temperature in °C.
    pub temperature: Option<f32>,
    /// Relative humidity in %.
    pub humidity: Option<f32>,
    /// Relay states; empty until the relay characteristic is bound.
    pub relays: Vec<bool>,
    /// Characteristics with confirmed subscriptions.
    pub characteristics: CharacteristicSet,
}

impl SessionSnapshot {
    /// Snapshot with no peripheral selected.
    pub fn detached(phase: ConnectionPhase) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    /// Whether values are flowing.
    pub fn is_streaming(&self) -> bool {
        self.phase == ConnectionPhase::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picosense_types::uuids;

    fn handle(uuid: uuid::Uuid) -> CharacteristicHandle {
        CharacteristicHandle::new("AA", uuids::ENVIRONMENTAL_SENSING_SERVICE, uuid)
    }

    #[test]
    fn test_characteristic_set_bind_and_clear() {
        let mut set = CharacteristicSet::default();
        assert!(set.is_empty());
        assert_eq!(set.missing().len(), 3);

        set.set(CharacteristicKind::Humidity, handle(uuids::HUMIDITY));
        assert!(!set.is_empty());
        assert_eq!(
            set.missing(),
            vec![CharacteristicKind::Temperature, CharacteristicKind::Relay]
        );
        assert_eq!(set.handles().count(), 1);

        assert!(set.clear(CharacteristicKind::Humidity).is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn test_detached_snapshot() {
        let snapshot = SessionSnapshot::detached(ConnectionPhase::Scanning);
        assert!(!snapshot.is_connected);
        assert!(snapshot.peripheral_name.is_none());
        assert!(snapshot.relays.is_empty());
        assert!(snapshot.characteristics.is_empty());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ConnectionPhase::DiscoveringServices.to_string(), "discovering services");
    }
}
