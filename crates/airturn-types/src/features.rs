//! Feature bit sets reported by AirTurn peripherals.
//!
//! Bit positions are protocol constants: they are read straight out of the
//! features and mode characteristics and must never be renumbered.

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

bitflags! {
    /// Features available on a peripheral above the base feature set.
    ///
    /// Populated once during interrogation. Every programmable-property write
    /// is gated on the bit returned by [`WriteType::required_features`].
    ///
    /// [`WriteType::required_features`]: crate::WriteType::required_features
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct FeaturesAvailable: u16 {
        /// Connection speed configuration is available.
        const CONNECTION_SPEED_CONFIGURATION = 1 << 0;
        /// OS key repeat configuration is available.
        const OS_KEY_REPEAT_CONFIGURATION = 1 << 1;
        /// Port configuration is available.
        const PORT_CONFIG = 1 << 2;
        /// Analog ports are available.
        const ANALOG = 1 << 3;
        /// Pairing method configuration is available.
        const PAIRING_METHOD = 1 << 4;
        /// Extended port configuration is available.
        const EXTENDED_PORT_CONFIG = 1 << 5;
        /// Debounce time configuration is available.
        const DEBOUNCE_TIME = 1 << 6;
    }
}

impl FeaturesAvailable {
    /// True if every bit in `features` is present.
    #[must_use]
    pub fn has_features(self, features: FeaturesAvailable) -> bool {
        self.contains(features)
    }
}

bitflags! {
    /// Features available within a single mode.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ModeFeatures: u16 {
        /// Digital port configuration.
        const DIGITAL_PORT_CONFIG = 1 << 0;
        /// Analog port configuration.
        const ANALOG_PORT_CONFIG = 1 << 1;
        /// Proprietary output.
        const PROPRIETARY = 1 << 2;
        /// Keyboard output.
        const KEYBOARD = 1 << 3;
        /// Consumer control output.
        const CONSUMER = 1 << 4;
        /// Mouse output.
        const MOUSE = 1 << 5;
        /// Joystick output.
        const JOYSTICK = 1 << 6;
        /// MIDI output.
        const MIDI = 1 << 7;

        /// The output types a port can be configured as.
        const PORT_CONFIGURATION_TYPES = Self::KEYBOARD.bits()
            | Self::CONSUMER.bits()
            | Self::MOUSE.bits()
            | Self::JOYSTICK.bits()
            | Self::MIDI.bits();
    }
}

impl ModeFeatures {
    /// The output types of this mode, with wiring-config bits removed.
    #[must_use]
    pub fn output_types(self) -> ModeFeatures {
        self & ModeFeatures::PORT_CONFIGURATION_TYPES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_bit_positions() {
        assert_eq!(FeaturesAvailable::CONNECTION_SPEED_CONFIGURATION.bits(), 0x01);
        assert_eq!(FeaturesAvailable::OS_KEY_REPEAT_CONFIGURATION.bits(), 0x02);
        assert_eq!(FeaturesAvailable::PORT_CONFIG.bits(), 0x04);
        assert_eq!(FeaturesAvailable::ANALOG.bits(), 0x08);
        assert_eq!(FeaturesAvailable::PAIRING_METHOD.bits(), 0x10);
        assert_eq!(FeaturesAvailable::EXTENDED_PORT_CONFIG.bits(), 0x20);
        assert_eq!(FeaturesAvailable::DEBOUNCE_TIME.bits(), 0x40);
    }

    #[test]
    fn test_has_features_is_containment() {
        let available =
            FeaturesAvailable::ANALOG | FeaturesAvailable::OS_KEY_REPEAT_CONFIGURATION;

        assert!(available.has_features(FeaturesAvailable::ANALOG));
        assert!(available.has_features(FeaturesAvailable::empty()));
        assert!(available.has_features(available));
        assert!(!available.has_features(
            FeaturesAvailable::ANALOG | FeaturesAvailable::DEBOUNCE_TIME
        ));
        assert!(!FeaturesAvailable::empty().has_features(FeaturesAvailable::PORT_CONFIG));
    }

    #[test]
    fn test_port_configuration_types_mask() {
        assert_eq!(ModeFeatures::PORT_CONFIGURATION_TYPES.bits(), 0b1111_1000);

        let mode = ModeFeatures::DIGITAL_PORT_CONFIG
            | ModeFeatures::ANALOG_PORT_CONFIG
            | ModeFeatures::KEYBOARD
            | ModeFeatures::MIDI;
        assert_eq!(mode.output_types(), ModeFeatures::KEYBOARD | ModeFeatures::MIDI);
        assert!(ModeFeatures::PROPRIETARY.output_types().is_empty());
    }

    #[test]
    fn test_unknown_bits_truncated() {
        let features = FeaturesAvailable::from_bits_truncate(0xFF83);
        assert_eq!(
            features,
            FeaturesAvailable::CONNECTION_SPEED_CONFIGURATION
                | FeaturesAvailable::OS_KEY_REPEAT_CONFIGURATION
        );
    }
}
