//! Central configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use airturn_types::uuids;

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;

/// Default time without an advertisement before a peripheral is lost.
pub const DEFAULT_LOST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for a link to come up.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Default time allowed for interrogation after the link is up.
pub const DEFAULT_INTERROGATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for a write acknowledgement.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the central runtime.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use airturn_core::CentralConfig;
///
/// let config = CentralConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .write_timeout(Duration::from_secs(3));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    /// Time without an advertisement before a disconnected peripheral is lost.
    #[serde(with = "duration_secs")]
    pub lost_timeout: Duration,
    /// Time allowed from `connect` until the link is established.
    #[serde(with = "duration_secs")]
    pub connection_timeout: Duration,
    /// Time allowed for the interrogation reads once the link is up.
    #[serde(with = "duration_secs")]
    pub interrogation_timeout: Duration,
    /// Time allowed for a write to be acknowledged.
    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,
    /// Capacity of the event bus.
    pub event_capacity: usize,
    /// Services to filter scans by. Empty scans for everything.
    pub scan_filter_services: Vec<Uuid>,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            lost_timeout: DEFAULT_LOST_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            interrogation_timeout: DEFAULT_INTERROGATION_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            scan_filter_services: vec![uuids::AIRTURN_SERVICE],
        }
    }
}

impl CentralConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate signal interference,
    /// thick walls, or long distances.
    pub fn challenging_environment() -> Self {
        Self {
            lost_timeout: Duration::from_secs(20),
            connection_timeout: Duration::from_secs(25),
            interrogation_timeout: Duration::from_secs(20),
            write_timeout: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Create a config for fast, reliable environments.
    ///
    /// Uses shorter timeouts for quicker failure detection
    /// when pedals are nearby with strong signals.
    pub fn fast() -> Self {
        Self {
            lost_timeout: Duration::from_secs(6),
            connection_timeout: Duration::from_secs(8),
            interrogation_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Parse a config from TOML. Missing keys take their default values.
    ///
    /// ```
    /// use airturn_core::CentralConfig;
    ///
    /// let config = CentralConfig::from_toml_str("write_timeout = 2.5").unwrap();
    /// assert_eq!(config.write_timeout.as_millis(), 2500);
    /// assert_eq!(config.event_capacity, 100);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the lost timeout.
    #[must_use]
    pub fn lost_timeout(mut self, timeout: Duration) -> Self {
        self.lost_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the interrogation timeout.
    #[must_use]
    pub fn interrogation_timeout(mut self, timeout: Duration) -> Self {
        self.interrogation_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the event bus capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the services scans are filtered by.
    #[must_use]
    pub fn scan_filter_services(mut self, services: Vec<Uuid>) -> Self {
        self.scan_filter_services = services;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("lost_timeout", self.lost_timeout),
            ("connection_timeout", self.connection_timeout),
            ("interrogation_timeout", self.interrogation_timeout),
            ("write_timeout", self.write_timeout),
        ];
        for (name, timeout) in timeouts {
            if timeout.is_zero() {
                return Err(Error::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CentralConfig::default();
        assert_eq!(config.lost_timeout, Duration::from_secs(10));
        assert_eq!(config.connection_timeout, Duration::from_secs(15));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.event_capacity, 100);
        assert_eq!(config.scan_filter_services, vec![uuids::AIRTURN_SERVICE]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(CentralConfig::fast().validate().is_ok());
        assert!(CentralConfig::challenging_environment().validate().is_ok());
        assert!(
            CentralConfig::fast().connection_timeout
                < CentralConfig::challenging_environment().connection_timeout
        );
    }

    #[test]
    fn test_validate_rejects_zero() {
        let err = CentralConfig::default()
            .write_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("write_timeout"));

        assert!(
            CentralConfig::default()
                .event_capacity(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let config = CentralConfig::fast().scan_filter_services(Vec::new());
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("lost_timeout = 6.0"));
        assert_eq!(CentralConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_toml_rejects_invalid() {
        assert!(matches!(
            CentralConfig::from_toml_str("lost_timeout = 0"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            CentralConfig::from_toml_str("lost_timeout = \"soon\""),
            Err(Error::InvalidConfig(_))
        ));
    }
}
