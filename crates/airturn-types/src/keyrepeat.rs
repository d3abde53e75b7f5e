//! Key repeat timing derived from the delay and rate registers.
//!
//! The peripheral stores two raw bytes: a delay-before-repeat multiplier and a
//! repeat-rate divisor. Everything here is pure arithmetic over those bytes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Longest delay before repeat, in seconds (multiplier 255).
pub const MAX_DELAY_BEFORE_REPEAT: f64 = 4.0;

/// Longest repeat interval, in seconds (divisor 1).
pub const MAX_REPEAT_RATE: f64 = 4.0;

/// Shortest useful repeat interval, in seconds.
pub const MIN_REPEAT_RATE: f64 = 1.0 / 64.0;

/// Suggested delay before repeat multiplier (about one second).
pub const DEFAULT_DELAY_BEFORE_REPEAT_MULTIPLIER: u8 = 64;

/// Suggested repeat rate divisor (a quarter second).
pub const DEFAULT_REPEAT_RATE_DIVISOR: u8 = 16;

/// Suggested key repeat setting.
pub const DEFAULT_KEY_REPEAT_ENABLED: bool = true;

/// Suggested OS key repeat setting.
pub const DEFAULT_OS_KEY_REPEAT: bool = false;

/// The pair of key repeat registers of a peripheral.
///
/// # Example
///
/// ```
/// use airturn_types::KeyRepeat;
///
/// let repeat = KeyRepeat::new(255, 16);
/// assert_eq!(repeat.delay_seconds(), 4.0);
/// assert_eq!(repeat.rate_seconds(), Some(0.25));
/// assert!(repeat.is_enabled());
///
/// // multiplier 0 with divisor 1 hands repeating to the host OS
/// assert!(KeyRepeat::OS.is_os_key_repeat());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyRepeat {
    /// Delay before repeat multiplier.
    pub multiplier: u8,
    /// Repeat rate divisor.
    pub divisor: u8,
}

impl Default for KeyRepeat {
    fn default() -> Self {
        Self::new(
            DEFAULT_DELAY_BEFORE_REPEAT_MULTIPLIER,
            DEFAULT_REPEAT_RATE_DIVISOR,
        )
    }
}

impl KeyRepeat {
    /// Repeating disabled on the device.
    pub const DISABLED: KeyRepeat = KeyRepeat::new(0, 0);

    /// Repeating delegated to the host operating system.
    pub const OS: KeyRepeat = KeyRepeat::new(0, 1);

    #[must_use]
    pub const fn new(multiplier: u8, divisor: u8) -> Self {
        Self {
            multiplier,
            divisor,
        }
    }

    /// Seconds a port must be held before the first repeat.
    #[must_use]
    pub fn delay_seconds(&self) -> f64 {
        delay_seconds(self.multiplier)
    }

    /// Seconds between repeats, `None` when the divisor is zero.
    #[must_use]
    pub fn rate_seconds(&self) -> Option<f64> {
        rate_seconds(self.divisor)
    }

    /// True when the device generates repeats itself.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.multiplier != 0 && self.divisor != 0
    }

    /// True when repeating is handed to the host OS.
    #[must_use]
    pub fn is_os_key_repeat(&self) -> bool {
        self.multiplier == 0 && self.divisor == 1
    }
}

/// Delay before repeat for a raw multiplier: `4 * multiplier / 255` seconds.
#[must_use]
pub fn delay_seconds(multiplier: u8) -> f64 {
    MAX_DELAY_BEFORE_REPEAT * f64::from(multiplier) / 255.0
}

/// Repeat interval for a raw divisor: `4 / divisor` seconds.
#[must_use]
pub fn rate_seconds(divisor: u8) -> Option<f64> {
    (divisor != 0).then(|| MAX_REPEAT_RATE / f64::from(divisor))
}
