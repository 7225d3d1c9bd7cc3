//! Platform-agnostic types for the Pi Pico environmental sensor.
//!
//! This crate holds everything about the peripheral that does not need a
//! Bluetooth stack: GATT UUIDs, the domain values, and the wire codec that
//! turns characteristic payloads into readings and relay states.
//!
//! # Example
//!
//! ```
//! use picosense_types::{RelayVector, codec};
//!
//! let reading = codec::decode_fixed_point(&[0x39, 0x09]).unwrap();
//! assert_eq!(reading.raw(), 2361);
//!
//! let mut relays = RelayVector::new(2);
//! relays.set(1, true);
//! assert_eq!(codec::encode_relay_vector(&relays), vec![0x02]);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod uuid;

pub use codec::{decode_fixed_point, decode_relay_vector, encode_relay_vector};
pub use error::{ParseError, ParseResult};
pub use types::{
    CharacteristicKind, DEFAULT_RELAY_COUNT, MAX_RELAY_COUNT, PeripheralIdentity, RelayVector,
    SensorReading,
};
pub use uuid as uuids;
