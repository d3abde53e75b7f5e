//! Logical register and notification payloads.
//!
//! All multi-byte integers are little-endian. Strings are UTF-8 with any
//! trailing NUL padding removed.

use bytes::{Buf, BufMut, Bytes, BytesMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::features::{FeaturesAvailable, ModeFeatures};
use crate::types::{
    AnalogValue, ChargingState, ConnectionConfiguration, DebounceTime, DeviceType, KeyCode, Mode,
    ModeDescriptor, PairingMethod, PairingState, Port, PortState, WriteType,
};
use crate::uuid as ids;

/// Maximum device name length, in characters.
pub const MAX_DEVICE_NAME_LENGTH: usize = 20;

/// Battery percentage at or below which the battery is considered low.
pub const LOW_BATTERY_LEVEL: u8 = 10;

/// Suggested idle power off interval, in seconds.
pub const DEFAULT_IDLE_POWER_OFF: u16 = 3600;

/// Suggested connection configuration.
pub const DEFAULT_CONNECTION_CONFIGURATION: ConnectionConfiguration =
    ConnectionConfiguration::LowPower;

/// Shortest debounce time the engine will write, in milliseconds.
pub const MIN_DEBOUNCE_TIME: DebounceTime = 1;

/// Longest debounce time the engine will write, in milliseconds.
pub const MAX_DEBOUNCE_TIME: DebounceTime = 1000;

/// Decode the device type register. `0xFF` and unknown codes decode as `Invalid`.
pub fn parse_device_type(data: &[u8]) -> ParseResult<DeviceType> {
    ParseError::check_len(data, 1)?;
    Ok(DeviceType::from(data[0]))
}

/// Decode the features-available register, dropping bits the protocol does not define.
pub fn parse_features(data: &[u8]) -> ParseResult<FeaturesAvailable> {
    Ok(FeaturesAvailable::from_bits_truncate(parse_u16(data)?))
}

/// Decode a single-byte register.
pub fn parse_u8(data: &[u8]) -> ParseResult<u8> {
    ParseError::check_len(data, 1)?;
    Ok(data[0])
}

/// Decode a little-endian two-byte register.
pub fn parse_u16(data: &[u8]) -> ParseResult<u16> {
    ParseError::check_len(data, 2)?;
    let mut buf = data;
    Ok(buf.get_u16_le())
}

/// Decode a battery level, clamping to 0..=100.
pub fn parse_battery_level(data: &[u8]) -> ParseResult<u8> {
    Ok(parse_u8(data)?.min(100))
}

/// Decode a UTF-8 string register.
pub fn parse_string(data: &[u8]) -> ParseResult<String> {
    let trimmed = match data.iter().rposition(|&b| b != 0) {
        Some(last) => &data[..=last],
        None => &[],
    };
    std::str::from_utf8(trimmed)
        .map(str::to_owned)
        .map_err(|_| ParseError::InvalidUtf8)
}

/// Decode a revision string as a semantic version.
///
/// Missing minor/patch components are filled with zero and a leading `v` is
/// ignored, so `"1.2"` and `"v1.2"` both decode as `1.2.0`.
///
/// ```
/// use airturn_types::payload::parse_version;
///
/// assert_eq!(parse_version(b"1.2").unwrap(), semver::Version::new(1, 2, 0));
/// assert_eq!(parse_version(b"2.0.7\0\0").unwrap(), semver::Version::new(2, 0, 7));
/// assert!(parse_version(b"banana").is_err());
/// ```
pub fn parse_version(data: &[u8]) -> ParseResult<semver::Version> {
    let text = parse_string(data)?;
    let text = text.trim();
    let text = text.strip_prefix(['v', 'V']).unwrap_or(text);

    let components = text.split(['-', '+']).next().unwrap_or_default().split('.').count();
    let padded = match components {
        1 => {
            let (core, rest) = split_core(text);
            format!("{core}.0.0{rest}")
        }
        2 => {
            let (core, rest) = split_core(text);
            format!("{core}.0{rest}")
        }
        _ => text.to_owned(),
    };

    semver::Version::parse(&padded)
        .map_err(|e| ParseError::InvalidValue(format!("version {text:?}: {e}")))
}

fn split_core(text: &str) -> (&str, &str) {
    match text.find(['-', '+']) {
        Some(at) => text.split_at(at),
        None => (text, ""),
    }
}

/// The current mode and the descriptor of every mode, read during interrogation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModeTable {
    /// Mode active when the table was read.
    pub current: Mode,
    /// One descriptor per mode, starting at mode 1.
    pub descriptors: Vec<ModeDescriptor>,
}

impl ModeTable {
    /// Decode `[current, features(mode 1) u16, features(mode 2) u16, ...]`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] for an empty payload and
    /// [`ParseError::InvalidValue`] for a dangling half entry, more than eight
    /// modes or a current mode outside the table.
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        ParseError::check_len(data, 1)?;
        let mut buf = data;
        let current = buf.get_u8();

        if buf.remaining() % 2 != 0 {
            return Err(ParseError::InvalidValue(format!(
                "mode table has {} trailing bytes",
                buf.remaining()
            )));
        }
        let count = buf.remaining() / 2;
        if count > usize::from(Mode::MAX.number()) {
            return Err(ParseError::InvalidValue(format!("{count} modes")));
        }
        if usize::from(current) > count {
            return Err(ParseError::InvalidValue(format!(
                "current mode {current} outside {count} modes"
            )));
        }

        let mut descriptors = Vec::with_capacity(count);
        for number in 1..=count {
            let features = ModeFeatures::from_bits_truncate(buf.get_u16_le());
            // count <= 8, so every number is a valid mode
            if let Some(mode) = Mode::new(number as u8) {
                descriptors.push(ModeDescriptor { mode, features });
            }
        }

        Ok(Self {
            current: Mode::new(current).unwrap_or(Mode::NONE),
            descriptors,
        })
    }

    /// The descriptor for `mode`, if the table has one.
    #[must_use]
    pub fn descriptor(&self, mode: Mode) -> Option<&ModeDescriptor> {
        self.descriptors.iter().find(|d| d.mode == mode)
    }
}

/// A digital port transition reported by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortNotification {
    pub port: Port,
    pub state: PortState,
    /// Key code sent alongside the transition, reported by HID devices only.
    pub key_code: Option<KeyCode>,
}

/// An analog port value reported by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalogNotification {
    pub port: Port,
    pub value: AnalogValue,
}

/// A decoded notification from one of the subscribed characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Notification {
    Port(PortNotification),
    Analog(AnalogNotification),
    BatteryLevel(u8),
    ChargingState(ChargingState),
    Mode(Mode),
    PairingState(PairingState),
}

impl Notification {
    /// Decode a notification value. Returns `Ok(None)` for characteristics
    /// that do not carry notifications.
    pub fn parse(characteristic: uuid::Uuid, data: &[u8]) -> ParseResult<Option<Self>> {
        let notification = match characteristic {
            ids::PORT_STATE => {
                ParseError::check_len(data, 2)?;
                let port = Port::try_from(data[0])?;
                let state = PortState::from(data[1]);
                if state == PortState::Invalid {
                    return Err(ParseError::InvalidValue(format!("port state {}", data[1])));
                }
                Notification::Port(PortNotification {
                    port,
                    state,
                    key_code: data.get(2).copied(),
                })
            }
            ids::ANALOG_VALUE => {
                ParseError::check_len(data, 3)?;
                let mut buf = data;
                let port = Port::try_from(buf.get_u8())?;
                Notification::Analog(AnalogNotification {
                    port,
                    value: buf.get_i16_le(),
                })
            }
            ids::BATTERY_LEVEL => Notification::BatteryLevel(parse_battery_level(data)?),
            ids::CHARGING_STATE => {
                Notification::ChargingState(ChargingState::try_from(parse_u8(data)?)?)
            }
            ids::CURRENT_MODE => {
                let number = parse_u8(data)?;
                let mode = Mode::new(number)
                    .ok_or_else(|| ParseError::InvalidValue(format!("mode {number}")))?;
                Notification::Mode(mode)
            }
            ids::PAIRING_STATE => Notification::PairingState(PairingState::from(parse_u8(data)?)),
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }
}

/// A value for one of the programmable properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WriteValue {
    DelayBeforeRepeat(u8),
    RepeatRate(u8),
    IdlePowerOff(u16),
    ConnectionConfiguration(ConnectionConfiguration),
    PairingMethod(PairingMethod),
    DebounceTime(DebounceTime),
}

impl WriteValue {
    /// Which property this value targets.
    #[must_use]
    pub fn write_type(&self) -> WriteType {
        match self {
            WriteValue::DelayBeforeRepeat(_) => WriteType::DelayBeforeRepeat,
            WriteValue::RepeatRate(_) => WriteType::RepeatRate,
            WriteValue::IdlePowerOff(_) => WriteType::IdlePowerOff,
            WriteValue::ConnectionConfiguration(_) => WriteType::ConnectionConfiguration,
            WriteValue::PairingMethod(_) => WriteType::PairingMethod,
            WriteValue::DebounceTime(_) => WriteType::DebounceTime,
        }
    }

    /// Check the value against the range the device accepts.
    ///
    /// Byte registers accept their whole range; debounce time must lie in
    /// `MIN_DEBOUNCE_TIME..=MAX_DEBOUNCE_TIME`.
    pub fn validate(&self) -> ParseResult<()> {
        match self {
            WriteValue::DebounceTime(ms)
                if !(MIN_DEBOUNCE_TIME..=MAX_DEBOUNCE_TIME).contains(ms) =>
            {
                Err(ParseError::InvalidValue(format!(
                    "debounce time {ms} ms outside {MIN_DEBOUNCE_TIME}..={MAX_DEBOUNCE_TIME}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Encode the value for the property's characteristic.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2);
        match *self {
            WriteValue::DelayBeforeRepeat(v) | WriteValue::RepeatRate(v) => buf.put_u8(v),
            WriteValue::IdlePowerOff(v) | WriteValue::DebounceTime(v) => buf.put_u16_le(v),
            WriteValue::ConnectionConfiguration(c) => buf.put_u8(c as u8),
            WriteValue::PairingMethod(m) => buf.put_u8(m as u8),
        }
        buf.freeze()
    }
}
