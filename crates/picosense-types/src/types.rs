//! Core types for Pi Pico sensor readings and relay state.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of relays fitted to the reference board.
///
/// The peripheral offers no way to query this, so it is supplied by
/// configuration; this is only the default.
pub const DEFAULT_RELAY_COUNT: usize = 2;

/// Largest relay bank a single write can carry.
///
/// A write without response is limited to `ATT_MTU - 3` bytes, which is 20
/// bytes with the default MTU of 23.
pub const MAX_RELAY_COUNT: usize = 20 * 8;

/// Size of a temperature or humidity payload in bytes.
pub const FIXED_POINT_READING_BYTES: usize = 2;

/// A fixed-point sensor value with two decimal places.
///
/// The wire value is a signed 16-bit integer; the physical value is
/// `raw / 100` (degrees Celsius for temperature, percent for humidity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorReading {
    raw: i16,
}

impl SensorReading {
    /// Wrap a raw wire value.
    pub const fn from_raw(raw: i16) -> Self {
        Self { raw }
    }

    /// The raw wire value in hundredths.
    pub const fn raw(&self) -> i16 {
        self.raw
    }

    /// The scaled physical value.
    pub fn value(&self) -> f32 {
        f32::from(self.raw) / 100.0
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.value())
    }
}

impl From<SensorReading> for f32 {
    fn from(reading: SensorReading) -> Self {
        reading.value()
    }
}

/// The three characteristics the board exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CharacteristicKind {
    /// Temperature in 0.01 °C.
    Temperature,
    /// Relative humidity in 0.01 %.
    Humidity,
    /// Packed relay output bits.
    Relay,
}

impl CharacteristicKind {
    /// All kinds in subscription order.
    pub const ALL: [CharacteristicKind; 3] = [
        CharacteristicKind::Temperature,
        CharacteristicKind::Humidity,
        CharacteristicKind::Relay,
    ];

    /// The GATT characteristic UUID for this kind.
    pub fn uuid(&self) -> uuid::Uuid {
        match self {
            CharacteristicKind::Temperature => crate::uuid::TEMPERATURE,
            CharacteristicKind::Humidity => crate::uuid::HUMIDITY,
            CharacteristicKind::Relay => crate::uuid::RELAY_CONTROL,
        }
    }

    /// Look up the kind for a characteristic UUID.
    pub fn from_uuid(uuid: &uuid::Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.uuid() == *uuid)
    }
}

impl fmt::Display for CharacteristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicKind::Temperature => write!(f, "temperature"),
            CharacteristicKind::Humidity => write!(f, "humidity"),
            CharacteristicKind::Relay => write!(f, "relay"),
        }
    }
}

/// A peripheral picked up during discovery.
///
/// `id` is the platform identifier (a MAC address on Linux/Windows, a
/// CoreBluetooth UUID on macOS) and is what the link adapter connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeripheralIdentity {
    /// Platform identifier.
    pub id: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
}

impl PeripheralIdentity {
    /// Create an identity without a name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Create an identity with an advertised name.
    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The state of the relay bank, one flag per physical relay.
///
/// The length is fixed when the vector is created and never changes; writes
/// to the peripheral always carry the whole vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RelayVector {
    states: Vec<bool>,
}

impl RelayVector {
    /// A vector of `len` relays, all off.
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![false; len],
        }
    }

    /// Number of relays.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the vector holds no relays.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State of relay `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.states.get(index).copied()
    }

    /// Set relay `index`. Returns `false` (and changes nothing) if `index`
    /// is out of range.
    pub fn set(&mut self, index: usize, on: bool) -> bool {
        match self.states.get_mut(index) {
            Some(state) => {
                *state = on;
                true
            }
            None => false,
        }
    }

    /// The relay states in index order.
    pub fn as_slice(&self) -> &[bool] {
        &self.states
    }

    /// Iterate over relay states in index order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.states.iter().copied()
    }

    /// Pack the vector into its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::codec::encode_relay_vector(self)
    }

    /// Unpack `len` relays from a wire payload.
    pub fn from_bytes(data: &[u8], len: usize) -> Self {
        crate::codec::decode_relay_vector(data, len)
    }
}

impl From<Vec<bool>> for RelayVector {
    fn from(states: Vec<bool>) -> Self {
        Self { states }
    }
}

impl From<RelayVector> for Vec<bool> {
    fn from(vector: RelayVector) -> Self {
        vector.states
    }
}

impl TryFrom<&[u8]> for SensorReading {
    type Error = ParseError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        crate::codec::decode_fixed_point(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_reading_value() {
        assert!((SensorReading::from_raw(2361).value() - 23.61).abs() < 0.001);
        assert!((SensorReading::from_raw(-1).value() + 0.01).abs() < 0.001);
        assert_eq!(SensorReading::from_raw(0).value(), 0.0);
    }

    #[test]
    fn test_sensor_reading_display() {
        assert_eq!(SensorReading::from_raw(2361).to_string(), "23.61");
        assert_eq!(SensorReading::from_raw(-150).to_string(), "-1.50");
    }

    #[test]
    fn test_characteristic_kind_uuid_lookup() {
        for kind in CharacteristicKind::ALL {
            assert_eq!(CharacteristicKind::from_uuid(&kind.uuid()), Some(kind));
        }
        assert_eq!(
            CharacteristicKind::from_uuid(&crate::uuid::ENVIRONMENTAL_SENSING_SERVICE),
            None
        );
    }

    #[test]
    fn test_relay_vector_set_in_range() {
        let mut relays = RelayVector::new(2);
        assert!(relays.set(1, true));
        assert_eq!(relays.as_slice(), &[false, true]);
    }

    #[test]
    fn test_relay_vector_set_out_of_range_is_noop() {
        let mut relays = RelayVector::new(2);
        assert!(!relays.set(2, true));
        assert_eq!(relays, RelayVector::new(2));
        assert_eq!(relays.len(), 2);
    }

    #[test]
    fn test_peripheral_identity_display() {
        let named = PeripheralIdentity::with_name("AA:BB:CC:DD:EE:FF", "Pi Pico Sensor");
        assert_eq!(named.to_string(), "Pi Pico Sensor (AA:BB:CC:DD:EE:FF)");
        let unnamed = PeripheralIdentity::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(unnamed.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_relay_vector_serializes_as_array() {
        let relays = RelayVector::from(vec![true, false]);
        assert_eq!(serde_json::to_string(&relays).unwrap(), "[true,false]");
    }
}
