//! Bluetooth UUIDs for AirTurn peripherals.
//!
//! This module contains all the UUIDs the engine reads, writes or subscribes
//! to when talking to an AirTurn device over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- AirTurn Service UUIDs ---

/// AirTurn control service, advertised by every peripheral the engine manages.
pub const AIRTURN_SERVICE: Uuid = uuid!("c1d0a000-1f38-4d3f-9e2a-7c2b6f3a1e00");

// --- AirTurn Characteristic UUIDs ---

/// Device type register (read).
pub const DEVICE_TYPE: Uuid = uuid!("c1d0a001-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Features-available bitmask (read).
pub const FEATURES: Uuid = uuid!("c1d0a002-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Delay before repeat multiplier (read, write).
pub const DELAY_BEFORE_REPEAT: Uuid = uuid!("c1d0a003-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Repeat rate divisor (read, write).
pub const REPEAT_RATE: Uuid = uuid!("c1d0a004-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Idle power off interval in seconds (read, write).
pub const IDLE_POWER_OFF: Uuid = uuid!("c1d0a005-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Connection configuration (read, write).
pub const CONNECTION_CONFIGURATION: Uuid = uuid!("c1d0a006-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Pairing method (read, write). Only present with the pairing method feature.
pub const PAIRING_METHOD: Uuid = uuid!("c1d0a007-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Debounce time in milliseconds (read, write). Only present with the debounce feature.
pub const DEBOUNCE_TIME: Uuid = uuid!("c1d0a008-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Current mode followed by the per-mode feature list (read).
pub const MODES: Uuid = uuid!("c1d0a009-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Current mode changes (notify).
pub const CURRENT_MODE: Uuid = uuid!("c1d0a00a-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Digital port transitions (notify).
pub const PORT_STATE: Uuid = uuid!("c1d0a00b-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Analog port values (notify).
pub const ANALOG_VALUE: Uuid = uuid!("c1d0a00c-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Charging state (read, notify).
pub const CHARGING_STATE: Uuid = uuid!("c1d0a00d-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Pairing state (notify).
pub const PAIRING_STATE: Uuid = uuid!("c1d0a00e-1f38-4d3f-9e2a-7c2b6f3a1e00");

/// Factory default device name (read).
pub const DEFAULT_NAME: Uuid = uuid!("c1d0a00f-1f38-4d3f-9e2a-7c2b6f3a1e00");

// --- Standard BLE Service UUIDs ---

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

// --- Standard Characteristic UUIDs ---

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Hardware revision string characteristic.
pub const HARDWARE_REVISION: Uuid = uuid!("00002a27-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic (read, notify).
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Characteristics the engine subscribes to once a peripheral is ready.
pub const NOTIFY_CHARACTERISTICS: [Uuid; 6] = [
    PORT_STATE,
    ANALOG_VALUE,
    BATTERY_LEVEL,
    CHARGING_STATE,
    CURRENT_MODE,
    PAIRING_STATE,
];
