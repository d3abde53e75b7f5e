//! The peripheral entity and its cached device state.

use semver::Version;
use serde::Serialize;

use airturn_types::payload::{DEFAULT_CONNECTION_CONFIGURATION, DEFAULT_IDLE_POWER_OFF};
use airturn_types::{
    AnalogValue, ChargingState, ConnectionConfiguration, ConnectionState, DebounceTime,
    DeviceType, FeaturesAvailable, InputType, KeyCode, KeyRepeat, LOW_BATTERY_LEVEL,
    MAX_NUMBER_OF_PORTS, Mode, ModeDescriptor, PairingMethod, PairingState, Port, PortState,
};

use crate::events::PeripheralRef;

/// Live state of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PortStatus {
    /// Digital state.
    pub state: PortState,
    /// Repeats generated since the port last went down.
    pub repeat_count: u32,
    /// Last analog value, if the port reported one.
    pub analog_value: Option<AnalogValue>,
    /// Key code sent with the last transition, HID devices only.
    pub key_code: Option<KeyCode>,
}

/// An AirTurn peripheral as known to the central.
///
/// Snapshots of this type are returned by [`crate::Central::peripheral`].
/// Register values are only meaningful once the peripheral is
/// [`ConnectionState::Ready`]; before that they hold their suggested defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peripheral {
    /// Stable identifier, unchanged across reconnects.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Factory default name, read during interrogation.
    pub default_name: Option<String>,
    /// True when the name was stored by the application.
    pub has_custom_name: bool,
    /// Signal strength of the last advertisement.
    pub rssi: Option<i16>,
    pub connection_state: ConnectionState,
    pub device_type: DeviceType,
    /// The last connection attempt failed.
    pub last_connection_failed: bool,
    /// Caller-provided hint that a bond exists that blocks connecting.
    pub has_bonding: bool,
    /// Pairing was rejected, or a bond conflicted.
    pub pairing_failed: bool,
    pub pairing_state: PairingState,
    pub firmware_version: Option<Version>,
    pub hardware_version: Option<Version>,
    pub features: FeaturesAvailable,
    /// Battery percentage, 0 to 100.
    pub battery_level: Option<u8>,
    pub charging_state: ChargingState,
    pub delay_before_repeat_multiplier: u8,
    pub repeat_rate_divisor: u8,
    /// Seconds of inactivity before the device powers off.
    pub idle_power_off: u16,
    pub connection_configuration: ConnectionConfiguration,
    /// Present only with the pairing method feature.
    pub pairing_method: Option<PairingMethod>,
    /// Present only with the debounce time feature.
    pub debounce_time: Option<DebounceTime>,
    pub current_mode: Mode,
    pub modes: Vec<ModeDescriptor>,
    pub ports: [PortStatus; MAX_NUMBER_OF_PORTS],
}

impl Peripheral {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        let repeat = KeyRepeat::default();
        Self {
            id: id.into(),
            name: None,
            default_name: None,
            has_custom_name: false,
            rssi: None,
            connection_state: ConnectionState::Disconnected,
            device_type: DeviceType::Unknown,
            last_connection_failed: false,
            has_bonding: false,
            pairing_failed: false,
            pairing_state: PairingState::NotPaired,
            firmware_version: None,
            hardware_version: None,
            features: FeaturesAvailable::empty(),
            battery_level: None,
            charging_state: ChargingState::default(),
            delay_before_repeat_multiplier: repeat.multiplier,
            repeat_rate_divisor: repeat.divisor,
            idle_power_off: DEFAULT_IDLE_POWER_OFF,
            connection_configuration: DEFAULT_CONNECTION_CONFIGURATION,
            pairing_method: None,
            debounce_time: None,
            current_mode: Mode::NONE,
            modes: Vec::new(),
            ports: [PortStatus::default(); MAX_NUMBER_OF_PORTS],
        }
    }

    /// Reference used to tag events.
    pub fn reference(&self) -> PeripheralRef {
        PeripheralRef {
            id: self.id.clone(),
            name: self.name.clone(),
            device_type: self.device_type,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.connection_state == ConnectionState::Ready
    }

    /// The key repeat registers.
    pub fn key_repeat(&self) -> KeyRepeat {
        KeyRepeat::new(self.delay_before_repeat_multiplier, self.repeat_rate_divisor)
    }

    pub fn key_repeat_enabled(&self) -> bool {
        self.key_repeat().is_enabled()
    }

    pub fn os_key_repeat(&self) -> bool {
        self.key_repeat().is_os_key_repeat()
    }

    pub fn delay_before_repeat_seconds(&self) -> f64 {
        self.key_repeat().delay_seconds()
    }

    pub fn repeat_rate_seconds(&self) -> Option<f64> {
        self.key_repeat().rate_seconds()
    }

    /// True if every bit in `features` is available.
    pub fn has_features(&self, features: FeaturesAvailable) -> bool {
        self.features.has_features(features)
    }

    pub fn input_type(&self) -> InputType {
        self.device_type.input_type()
    }

    pub fn port(&self, port: Port) -> &PortStatus {
        &self.ports[port.index()]
    }

    pub(crate) fn port_mut(&mut self, port: Port) -> &mut PortStatus {
        &mut self.ports[port.index()]
    }

    pub fn port_state(&self, port: Port) -> PortState {
        self.port(port).state
    }

    /// Descriptor of the active mode.
    pub fn current_mode_descriptor(&self) -> Option<&ModeDescriptor> {
        self.modes.iter().find(|d| d.mode == self.current_mode)
    }

    /// True when the battery level is known and at or below the low threshold.
    pub fn is_battery_low(&self) -> bool {
        self.battery_level.is_some_and(|level| level <= LOW_BATTERY_LEVEL)
    }

    /// Reset port state after the link goes away.
    pub(crate) fn clear_ports(&mut self) {
        self.ports = [PortStatus::default(); MAX_NUMBER_OF_PORTS];
    }
}
