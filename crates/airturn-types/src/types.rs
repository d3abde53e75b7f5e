//! Core value types for AirTurn peripherals.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::features::{FeaturesAvailable, ModeFeatures};

/// Type of AirTurn device.
///
/// Devices attached over a keyboard (HID) link cannot disclose their type and
/// report [`DeviceType::Unknown`].
///
/// This enum is marked `#[non_exhaustive]` to allow adding new device types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
#[repr(i8)]
pub enum DeviceType {
    /// A device type the engine does not support.
    Invalid = -1,
    /// Device type not (yet) known.
    #[default]
    Unknown = 0,
    /// HID keyboard device, probably a BT-105.
    Hid = 1,
    /// PED.
    Ped = 2,
    /// Virtual PED.
    VirtualPed = 3,
    /// PEDpro.
    PedPro = 4,
    /// DIGIT III.
    Digit3 = 5,
    /// BT200.
    Bt200 = 6,
    /// BT200S-2.
    Bt200S2 = 7,
    /// BT200S-4.
    Bt200S4 = 8,
    /// BT200S-6.
    Bt200S6 = 9,
}

impl DeviceType {
    /// The kind of inputs this device type has.
    ///
    /// ```
    /// use airturn_types::{DeviceType, InputType};
    ///
    /// assert_eq!(DeviceType::PedPro.input_type(), InputType::Pedal);
    /// assert_eq!(DeviceType::Bt200S2.input_type(), InputType::Switch);
    /// assert_eq!(DeviceType::Digit3.input_type(), InputType::Button);
    /// assert_eq!(DeviceType::Unknown.input_type(), InputType::Port);
    /// ```
    #[must_use]
    pub fn input_type(&self) -> InputType {
        match self {
            DeviceType::Ped | DeviceType::VirtualPed | DeviceType::PedPro => InputType::Pedal,
            DeviceType::Bt200S2 | DeviceType::Bt200S4 | DeviceType::Bt200S6 => InputType::Switch,
            DeviceType::Digit3 => InputType::Button,
            DeviceType::Invalid | DeviceType::Unknown | DeviceType::Hid | DeviceType::Bt200 => {
                InputType::Port
            }
        }
    }

    /// True for software-only peripherals that have no radio of their own.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self, DeviceType::VirtualPed)
    }

    /// True if the engine can talk to this device type at all.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        !matches!(self, DeviceType::Invalid)
    }
}

impl From<u8> for DeviceType {
    /// Decode the device type register. Unknown codes map to `Invalid`.
    fn from(value: u8) -> Self {
        match value {
            0 => DeviceType::Unknown,
            1 => DeviceType::Hid,
            2 => DeviceType::Ped,
            3 => DeviceType::VirtualPed,
            4 => DeviceType::PedPro,
            5 => DeviceType::Digit3,
            6 => DeviceType::Bt200,
            7 => DeviceType::Bt200S2,
            8 => DeviceType::Bt200S4,
            9 => DeviceType::Bt200S6,
            _ => DeviceType::Invalid,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Invalid => "Invalid",
            DeviceType::Unknown => "Unknown",
            DeviceType::Hid => "HID",
            DeviceType::Ped => "PED",
            DeviceType::VirtualPed => "vPED",
            DeviceType::PedPro => "PEDpro",
            DeviceType::Digit3 => "DIGIT III",
            DeviceType::Bt200 => "BT200",
            DeviceType::Bt200S2 => "BT200S-2",
            DeviceType::Bt200S4 => "BT200S-4",
            DeviceType::Bt200S6 => "BT200S-6",
        };
        f.write_str(name)
    }
}

/// The kind of inputs a device has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InputType {
    /// Generic ports: older keyboard-only and unknown devices.
    Port,
    /// Pedals, e.g. PEDpro.
    Pedal,
    /// Switches, e.g. BT200S-2.
    Switch,
    /// Buttons, e.g. DIGIT III.
    Button,
}

/// Connection state of a single peripheral.
///
/// `Unknown` and `Disconnected` are resting states. `Ready` is the only state
/// from which commands may be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ConnectionState {
    /// Not yet known.
    #[default]
    Unknown = 0,
    /// Link teardown in progress.
    Disconnecting = 1,
    /// No link.
    Disconnected = 2,
    /// Link establishment in progress.
    Connecting = 3,
    /// Link-layer connected, application protocol not yet negotiated.
    SystemConnected = 4,
    /// Interrogation in progress.
    Discovering = 5,
    /// Interrogated and ready for commands.
    Ready = 6,
}

impl ConnectionState {
    /// True for `Unknown` and `Disconnected`.
    #[must_use]
    pub fn is_resting(&self) -> bool {
        matches!(self, ConnectionState::Unknown | ConnectionState::Disconnected)
    }

    /// True while a link exists (system connected, discovering or ready).
    #[must_use]
    pub fn has_link(&self) -> bool {
        matches!(
            self,
            ConnectionState::SystemConnected | ConnectionState::Discovering | ConnectionState::Ready
        )
    }

    /// True while a connection attempt has not yet reached `Ready`.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::SystemConnected
                | ConnectionState::Discovering
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::SystemConnected => "system connected",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// State of the local central (radio/session) role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum CentralState {
    /// Not yet known.
    #[default]
    Unknown = 0,
    /// The radio is resetting; wait for the next state change.
    Resetting = 1,
    /// Bluetooth LE is not supported on this host.
    Unsupported = 2,
    /// Bluetooth LE is not authorized for this application.
    Unauthorized = 3,
    /// Bluetooth is powered off.
    PoweredOff = 4,
    /// The central has been disabled by the application.
    Disabled = 5,
    /// Powered and usable, no peripheral is ready.
    Disconnected = 6,
    /// At least one peripheral is ready.
    Connected = 7,
}

impl CentralState {
    /// True if the radio can scan and connect.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, CentralState::Disconnected | CentralState::Connected)
    }
}

impl fmt::Display for CentralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CentralState::Unknown => "unknown",
            CentralState::Resetting => "resetting",
            CentralState::Unsupported => "unsupported",
            CentralState::Unauthorized => "unauthorized",
            CentralState::PoweredOff => "powered off",
            CentralState::Disabled => "disabled",
            CentralState::Disconnected => "disconnected",
            CentralState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Number of modes a peripheral can have.
pub const MAX_NUMBER_OF_MODES: usize = 8;

/// A numbered configuration slot on a peripheral.
///
/// `Mode::NONE` (0) means no mode; 1 to 8 are real slots. Mode 1 is the iOS
/// mode, 2 to 8 are programmable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Mode(u8);

impl Mode {
    /// No mode.
    pub const NONE: Mode = Mode(0);
    /// The lowest mode number.
    pub const MIN: Mode = Mode(1);
    /// The highest mode number.
    pub const MAX: Mode = Mode(MAX_NUMBER_OF_MODES as u8);

    /// Create a mode from its number, `None` if outside 0..=8.
    #[must_use]
    pub fn new(number: u8) -> Option<Self> {
        (number <= Self::MAX.0).then_some(Mode(number))
    }

    /// The mode number.
    #[must_use]
    pub fn number(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "mode {}", self.0)
        }
    }
}

/// Read-only description of one mode, fetched during interrogation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModeDescriptor {
    /// The mode slot.
    pub mode: Mode,
    /// What the mode supports.
    pub features: ModeFeatures,
}

impl ModeDescriptor {
    /// The output protocols this mode can drive.
    #[must_use]
    pub fn output_types(&self) -> ModeFeatures {
        self.features.output_types()
    }
}

/// Number of ports a peripheral can have.
pub const MAX_NUMBER_OF_PORTS: usize = 8;

/// A port (pedal, switch or button input) number, 1 to 8.
///
/// Port 1 is usually 'Up', 2 'Left', 3 'Down' and 4 'Right'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Port(u8);

impl Port {
    /// The lowest port number.
    pub const MIN: Port = Port(1);
    /// The highest port number.
    pub const MAX: Port = Port(MAX_NUMBER_OF_PORTS as u8);

    /// Create a port from its number, `None` for 0 (invalid) or above 8.
    #[must_use]
    pub fn new(number: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&number)
            .then_some(Port(number))
    }

    /// The port number.
    #[must_use]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Iterate all valid ports in order.
    pub fn all() -> impl Iterator<Item = Port> {
        (Self::MIN.0..=Self::MAX.0).map(Port)
    }

    /// Zero-based index for per-port arrays.
    #[must_use]
    pub fn index(&self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for Port {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Port::new(value).ok_or_else(|| ParseError::InvalidValue(format!("port {value}")))
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}", self.0)
    }
}

/// State of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(i8)]
pub enum PortState {
    /// No state has been reported.
    #[default]
    Invalid = -1,
    /// Pedal not pressed.
    Up = 0,
    /// Pedal pressed.
    Down = 1,
}

impl From<u8> for PortState {
    fn from(value: u8) -> Self {
        match value {
            0 => PortState::Up,
            1 => PortState::Down,
            _ => PortState::Invalid,
        }
    }
}

/// Identifies which programmable property a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum WriteType {
    /// Delay before repeat multiplier.
    DelayBeforeRepeat = 1,
    /// Repeat rate divisor.
    RepeatRate = 2,
    /// Idle power off interval.
    IdlePowerOff = 3,
    /// Connection configuration.
    ConnectionConfiguration = 4,
    /// Pairing method.
    PairingMethod = 5,
    /// Debounce time.
    DebounceTime = 6,
}

impl WriteType {
    /// Every write type, in protocol order.
    pub const ALL: [WriteType; 6] = [
        WriteType::DelayBeforeRepeat,
        WriteType::RepeatRate,
        WriteType::IdlePowerOff,
        WriteType::ConnectionConfiguration,
        WriteType::PairingMethod,
        WriteType::DebounceTime,
    ];

    /// The feature bits a peripheral must report before this property may be written.
    ///
    /// ```
    /// use airturn_types::{FeaturesAvailable, WriteType};
    ///
    /// assert_eq!(
    ///     WriteType::RepeatRate.required_features(),
    ///     FeaturesAvailable::OS_KEY_REPEAT_CONFIGURATION
    /// );
    /// assert!(WriteType::IdlePowerOff.required_features().is_empty());
    /// ```
    #[must_use]
    pub fn required_features(&self) -> FeaturesAvailable {
        match self {
            WriteType::DelayBeforeRepeat | WriteType::RepeatRate => {
                FeaturesAvailable::OS_KEY_REPEAT_CONFIGURATION
            }
            WriteType::IdlePowerOff => FeaturesAvailable::empty(),
            WriteType::ConnectionConfiguration => {
                FeaturesAvailable::CONNECTION_SPEED_CONFIGURATION
            }
            WriteType::PairingMethod => FeaturesAvailable::PAIRING_METHOD,
            WriteType::DebounceTime => FeaturesAvailable::DEBOUNCE_TIME,
        }
    }

    /// The characteristic holding this property.
    #[must_use]
    pub fn characteristic(&self) -> uuid::Uuid {
        use crate::uuid as ids;
        match self {
            WriteType::DelayBeforeRepeat => ids::DELAY_BEFORE_REPEAT,
            WriteType::RepeatRate => ids::REPEAT_RATE,
            WriteType::IdlePowerOff => ids::IDLE_POWER_OFF,
            WriteType::ConnectionConfiguration => ids::CONNECTION_CONFIGURATION,
            WriteType::PairingMethod => ids::PAIRING_METHOD,
            WriteType::DebounceTime => ids::DEBOUNCE_TIME,
        }
    }

    /// Reverse of [`characteristic`](Self::characteristic).
    #[must_use]
    pub fn from_characteristic(characteristic: uuid::Uuid) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|write_type| write_type.characteristic() == characteristic)
    }
}

impl fmt::Display for WriteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteType::DelayBeforeRepeat => "delay before repeat",
            WriteType::RepeatRate => "repeat rate",
            WriteType::IdlePowerOff => "idle power off",
            WriteType::ConnectionConfiguration => "connection configuration",
            WriteType::PairingMethod => "pairing method",
            WriteType::DebounceTime => "debounce time",
        };
        f.write_str(name)
    }
}

/// Power/performance balance of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ConnectionConfiguration {
    /// Optimised for power saving.
    #[default]
    LowPower = 0,
    /// Optimised for responsiveness.
    LowLatency = 1,
}

impl TryFrom<u8> for ConnectionConfiguration {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionConfiguration::LowPower),
            1 => Ok(ConnectionConfiguration::LowLatency),
            _ => Err(ParseError::InvalidValue(format!(
                "connection configuration {value}"
            ))),
        }
    }
}

/// Charging state of the peripheral battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ChargingState {
    /// Not on external power, discharging.
    #[default]
    DisconnectedDischarging = 0,
    /// On external power, charging.
    ConnectedCharging = 1,
    /// On external power, fully charged.
    ConnectedFullyCharged = 2,
    /// On external power, battery being validated before charging.
    ConnectedValidating = 3,
    /// On external power, charging fault.
    ConnectedFault = 4,
}

impl TryFrom<u8> for ChargingState {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChargingState::DisconnectedDischarging),
            1 => Ok(ChargingState::ConnectedCharging),
            2 => Ok(ChargingState::ConnectedFullyCharged),
            3 => Ok(ChargingState::ConnectedValidating),
            4 => Ok(ChargingState::ConnectedFault),
            _ => Err(ParseError::InvalidValue(format!("charging state {value}"))),
        }
    }
}

/// Pairing state between the central and a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum PairingState {
    #[default]
    NotPaired = 0,
    Paired = 1,
}

impl From<u8> for PairingState {
    fn from(value: u8) -> Self {
        if value == 0 {
            PairingState::NotPaired
        } else {
            PairingState::Paired
        }
    }
}

/// Pairing method the peripheral operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum PairingMethod {
    /// No pairing in mode 1, pairing in other modes; up to 8 bonds, least
    /// recently used bond evicted.
    #[default]
    Open = 0,
    /// A single bond, pairing required in every mode.
    Closed = 1,
}

impl TryFrom<u8> for PairingMethod {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PairingMethod::Open),
            1 => Ok(PairingMethod::Closed),
            _ => Err(ParseError::InvalidValue(format!("pairing method {value}"))),
        }
    }
}

/// Debounce time in milliseconds.
pub type DebounceTime = u16;

/// Raw analog port value.
pub type AnalogValue = i16;

/// Largest analog value.
pub const ANALOG_VALUE_MAX: AnalogValue = i16::MAX;

/// Smallest analog value.
pub const ANALOG_VALUE_MIN: AnalogValue = i16::MIN;

/// Key code reported by HID devices alongside a port transition.
pub type KeyCode = u8;
