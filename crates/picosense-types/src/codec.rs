//! Wire codec for sensor and relay characteristic payloads.
//!
//! Temperature and humidity arrive as a little-endian two's-complement
//! `i16` in hundredths. The relay characteristic carries one bit per relay,
//! least significant bit first within each byte.

use bytes::Buf;

use crate::error::ParseError;
use crate::types::{FIXED_POINT_READING_BYTES, RelayVector, SensorReading};

/// Number of bytes needed to carry `count` relay bits.
pub const fn relay_payload_len(count: usize) -> usize {
    count.div_ceil(8)
}

/// Decode a temperature or humidity payload.
///
/// Only the first two bytes are read; anything after them is ignored so a
/// newer peripheral can append fields.
///
/// # Errors
///
/// Returns [`ParseError::MalformedPayload`] if `data` contains fewer than
/// two bytes.
#[must_use = "decoding returns a Result that should be handled"]
pub fn decode_fixed_point(data: &[u8]) -> Result<SensorReading, ParseError> {
    if data.len() < FIXED_POINT_READING_BYTES {
        return Err(ParseError::MalformedPayload {
            expected: FIXED_POINT_READING_BYTES,
            actual: data.len(),
        });
    }

    let mut buf = data;
    Ok(SensorReading::from_raw(buf.get_i16_le()))
}

/// Decode `len` relay states from a packed payload.
///
/// Bits past the end of `data` decode as `false`: the peripheral may omit
/// trailing all-zero bytes.
pub fn decode_relay_vector(data: &[u8], len: usize) -> RelayVector {
    (0..len)
        .map(|bit| {
            data.get(bit / 8)
                .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
        })
        .collect::<Vec<_>>()
        .into()
}

/// Pack a relay vector into `ceil(len / 8)` bytes.
///
/// Unused high bits of the final byte are always zero.
pub fn encode_relay_vector(relays: &RelayVector) -> Vec<u8> {
    let mut packed = vec![0u8; relay_payload_len(relays.len())];
    for (bit, on) in relays.iter().enumerate() {
        if on {
            packed[bit / 8] |= 1 << (bit % 8);
        }
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // --- Fixed-point decoding ---

    #[test]
    fn test_decode_fixed_point_positive() {
        // 0x0939 = 2361 -> 23.61
        let reading = decode_fixed_point(&[0x39, 0x09]).unwrap();
        assert_eq!(reading.raw(), 2361);
        assert!((reading.value() - 23.61).abs() < 0.001);
    }

    #[test]
    fn test_decode_fixed_point_negative() {
        // 0xFFFF = -1 -> -0.01
        let reading = decode_fixed_point(&[0xFF, 0xFF]).unwrap();
        assert_eq!(reading.raw(), -1);
        assert!((reading.value() + 0.01).abs() < 0.001);
    }

    #[test]
    fn test_decode_fixed_point_extremes() {
        assert_eq!(decode_fixed_point(&[0x00, 0x80]).unwrap().raw(), i16::MIN);
        assert_eq!(decode_fixed_point(&[0xFF, 0x7F]).unwrap().raw(), i16::MAX);
    }

    #[test]
    fn test_decode_fixed_point_ignores_trailing_bytes() {
        let reading = decode_fixed_point(&[0x39, 0x09, 0xAA, 0xBB]).unwrap();
        assert_eq!(reading.raw(), 2361);
    }

    #[test]
    fn test_decode_fixed_point_short_payload() {
        assert_eq!(
            decode_fixed_point(&[0x39]),
            Err(ParseError::MalformedPayload {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            decode_fixed_point(&[]),
            Err(ParseError::MalformedPayload {
                expected: 2,
                actual: 0
            })
        );
    }

    // --- Relay vectors ---

    #[test]
    fn test_relay_payload_len() {
        assert_eq!(relay_payload_len(0), 0);
        assert_eq!(relay_payload_len(1), 1);
        assert_eq!(relay_payload_len(8), 1);
        assert_eq!(relay_payload_len(9), 2);
        assert_eq!(relay_payload_len(64), 8);
    }

    #[test]
    fn test_decode_relay_vector_lsb_first() {
        let relays = decode_relay_vector(&[0b0000_0010], 2);
        assert_eq!(relays.as_slice(), &[false, true]);
    }

    #[test]
    fn test_decode_relay_vector_ignores_unused_bits() {
        // Bits beyond the relay count are not part of the vector.
        let relays = decode_relay_vector(&[0xFF], 2);
        assert_eq!(relays.as_slice(), &[true, true]);
    }

    #[test]
    fn test_decode_relay_vector_short_payload_pads_false() {
        let relays = decode_relay_vector(&[0x01], 10);
        assert_eq!(relays.len(), 10);
        assert_eq!(relays.get(0), Some(true));
        assert!(relays.iter().skip(1).all(|on| !on));

        let empty = decode_relay_vector(&[], 2);
        assert_eq!(empty, RelayVector::new(2));
    }

    #[test]
    fn test_encode_relay_vector() {
        let relays = RelayVector::from(vec![true, false]);
        assert_eq!(encode_relay_vector(&relays), vec![0x01]);

        let relays = RelayVector::from(vec![false, true]);
        assert_eq!(encode_relay_vector(&relays), vec![0x02]);

        let mut relays = RelayVector::new(9);
        relays.set(8, true);
        assert_eq!(encode_relay_vector(&relays), vec![0x00, 0x01]);
    }

    #[test]
    fn test_encode_relay_vector_clears_unused_high_bits() {
        let relays = RelayVector::from(vec![true; 3]);
        assert_eq!(encode_relay_vector(&relays), vec![0b0000_0111]);
    }

    proptest! {
        #[test]
        fn prop_relay_vector_round_trip(states in prop::collection::vec(any::<bool>(), 1..=64)) {
            let relays = RelayVector::from(states);
            let encoded = encode_relay_vector(&relays);
            prop_assert_eq!(encoded.len(), relay_payload_len(relays.len()));
            prop_assert_eq!(decode_relay_vector(&encoded, relays.len()), relays);
        }

        #[test]
        fn prop_decode_relay_vector_never_panics(
            data in prop::collection::vec(any::<u8>(), 0..16),
            len in 0usize..=128,
        ) {
            prop_assert_eq!(decode_relay_vector(&data, len).len(), len);
        }

        #[test]
        fn prop_fixed_point_matches_i16(raw in any::<i16>()) {
            let reading = decode_fixed_point(&raw.to_le_bytes()).unwrap();
            prop_assert_eq!(reading.raw(), raw);
        }
    }
}
