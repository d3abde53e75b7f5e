//! Platform-agnostic types for AirTurn foot-pedal peripherals.
//!
//! This crate provides the value types shared by the connection engine
//! (airturn-core) and any application embedding it.
//!
//! # Features
//!
//! - Device, connection and port enums with their protocol discriminants
//! - Feature bit sets with exact protocol bit positions
//! - Key repeat timing derived from the delay and rate registers
//! - UUID constants for BLE services and characteristics
//! - Register and notification payload decoding
//!
//! # Example
//!
//! ```
//! use airturn_types::{FeaturesAvailable, KeyRepeat, WriteType};
//!
//! let features = FeaturesAvailable::from_bits_truncate(0x0002);
//! assert!(features.has_features(WriteType::RepeatRate.required_features()));
//! assert!(!features.has_features(WriteType::DebounceTime.required_features()));
//!
//! assert!(KeyRepeat::default().is_enabled());
//! ```

pub mod error;
pub mod features;
pub mod keyrepeat;
pub mod payload;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use features::{FeaturesAvailable, ModeFeatures};
pub use keyrepeat::KeyRepeat;
pub use payload::{
    AnalogNotification, ModeTable, Notification, PortNotification, WriteValue,
    MAX_DEVICE_NAME_LENGTH, LOW_BATTERY_LEVEL,
};
pub use types::{
    AnalogValue, CentralState, ChargingState, ConnectionConfiguration, ConnectionState,
    DebounceTime, DeviceType, InputType, KeyCode, Mode, ModeDescriptor, PairingMethod,
    PairingState, Port, PortState, WriteType, MAX_NUMBER_OF_MODES, MAX_NUMBER_OF_PORTS,
};
pub use uuid as uuids;
