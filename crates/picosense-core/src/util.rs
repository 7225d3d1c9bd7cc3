//! Peripheral identifier helpers.

use btleplug::platform::PeripheralId;

/// Address CoreBluetooth reports for every peripheral.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they are MAC
/// addresses or D-Bus paths.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_debug_wrapper(&format!("{:?}", id)).to_string()
}

/// Pick the identifier a peripheral is addressed by.
///
/// Uses the Bluetooth address where the platform exposes it, and the
/// peripheral ID on macOS where every address reads as zeros.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == HIDDEN_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

fn strip_debug_wrapper(formatted: &str) -> &str {
    formatted
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_debug_wrapper() {
        assert_eq!(
            strip_debug_wrapper("PeripheralId(AA:BB:CC:DD:EE:FF)"),
            "AA:BB:CC:DD:EE:FF"
        );
        assert_eq!(strip_debug_wrapper("AA:BB"), "AA:BB");
    }
}
