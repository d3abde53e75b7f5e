//! Peripheral identifier helpers for the btleplug transport.

use btleplug::platform::PeripheralId;

/// Address reported by platforms that hide the Bluetooth address (macOS).
const UNRESOLVED_ADDRESS: &str = "00:00:00:00:00:00";

/// The platform peripheral id without its `PeripheralId(...)` wrapper.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// True when `address` is the placeholder of a platform that hides addresses.
pub fn is_unresolved_address(address: &str) -> bool {
    address.is_empty() || address == UNRESOLVED_ADDRESS
}

/// The stable identifier the engine uses for a peripheral.
///
/// The Bluetooth address where the platform exposes it, otherwise the
/// platform's own peripheral id.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_unresolved_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // PeripheralId has no public constructor, so only the address side is tested.
    #[test]
    fn test_unresolved_address() {
        assert!(is_unresolved_address("00:00:00:00:00:00"));
        assert!(is_unresolved_address(""));
        assert!(!is_unresolved_address("AA:BB:CC:DD:EE:FF"));
    }
}
