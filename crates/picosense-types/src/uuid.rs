//! Bluetooth UUIDs for the Pi Pico sensor board.
//!
//! The board exposes a single Environmental Sensing service carrying two
//! standard characteristics (temperature, humidity) and one vendor-specific
//! relay control characteristic.

use uuid::{Uuid, uuid};

// --- Service UUIDs ---

/// Environmental Sensing service (`0x181A`).
pub const ENVIRONMENTAL_SENSING_SERVICE: Uuid = uuid!("0000181a-0000-1000-8000-00805f9b34fb");

// --- Characteristic UUIDs ---

/// Temperature characteristic (`0x2A6E`), sint16 in 0.01 °C.
pub const TEMPERATURE: Uuid = uuid!("00002a6e-0000-1000-8000-00805f9b34fb");

/// Humidity characteristic (`0x2A6F`), sint16 in 0.01 %RH.
pub const HUMIDITY: Uuid = uuid!("00002a6f-0000-1000-8000-00805f9b34fb");

/// Vendor-specific relay control characteristic (packed relay bits).
pub const RELAY_CONTROL: Uuid = uuid!("e04e0525-ecbc-4e2c-aab6-a3ec009506c6");

/// Services the central filters on while scanning.
pub const REQUIRED_SERVICES: [Uuid; 1] = [ENVIRONMENTAL_SENSING_SERVICE];

/// Characteristics resolved during discovery, in subscription order.
pub const REQUIRED_CHARACTERISTICS: [Uuid; 3] = [TEMPERATURE, HUMIDITY, RELAY_CONTROL];

/// Expand a 16-bit SIG-assigned identifier onto the Bluetooth base UUID.
pub const fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environmental_sensing_service_uuid() {
        assert_eq!(
            ENVIRONMENTAL_SENSING_SERVICE.to_string(),
            "0000181a-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_relay_control_uuid() {
        assert_eq!(
            RELAY_CONTROL.to_string(),
            "e04e0525-ecbc-4e2c-aab6-a3ec009506c6"
        );
    }

    #[test]
    fn test_short_uuids_expand_on_base() {
        assert_eq!(from_short(0x181A), ENVIRONMENTAL_SENSING_SERVICE);
        assert_eq!(from_short(0x2A6E), TEMPERATURE);
        assert_eq!(from_short(0x2A6F), HUMIDITY);
    }

    #[test]
    fn test_characteristic_uuids_are_distinct() {
        assert_ne!(TEMPERATURE, HUMIDITY);
        assert_ne!(HUMIDITY, RELAY_CONTROL);
        assert_ne!(TEMPERATURE, RELAY_CONTROL);
    }

    #[test]
    fn test_standard_characteristic_prefix() {
        for uuid in [TEMPERATURE, HUMIDITY] {
            assert!(
                uuid.to_string().starts_with("00002a"),
                "UUID {} should start with 00002a",
                uuid
            );
        }
    }
}
