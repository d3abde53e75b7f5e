//! Firmware update check.
//!
//! The engine does not know where firmware is published. Applications plug
//! in a [`FirmwareCatalog`] that maps a device type to the latest released
//! version, and the check compares it with the version read from the
//! peripheral.
//!
//! A check answers `None` both when the peripheral is up to date and when
//! the answer cannot be determined (no catalog, catalog error, unknown
//! firmware version).

use std::collections::HashMap;

use async_trait::async_trait;
use semver::Version;
use tracing::{debug, warn};

use airturn_types::DeviceType;

use crate::error::Result;

/// Called once with the outcome of a firmware check.
pub type FirmwareCallback = Box<dyn FnOnce(Option<Version>) + Send>;

/// Source of the latest firmware version per device type.
#[async_trait]
pub trait FirmwareCatalog: Send + Sync {
    /// The latest released version for `device_type`, `None` if none is published.
    async fn latest_version(&self, device_type: DeviceType) -> Result<Option<Version>>;
}

/// A catalog backed by a fixed table.
///
/// # Example
///
/// ```
/// use airturn_core::firmware::{FirmwareCatalog, StaticCatalog};
/// use airturn_types::DeviceType;
///
/// #[tokio::main]
/// async fn main() {
///     let catalog = StaticCatalog::new()
///         .with_version(DeviceType::PedPro, semver::Version::new(2, 1, 0));
///
///     let latest = catalog.latest_version(DeviceType::PedPro).await.unwrap();
///     assert_eq!(latest, Some(semver::Version::new(2, 1, 0)));
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    versions: HashMap<DeviceType, Version>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `version` for `device_type`.
    #[must_use]
    pub fn with_version(mut self, device_type: DeviceType, version: Version) -> Self {
        self.versions.insert(device_type, version);
        self
    }
}

#[async_trait]
impl FirmwareCatalog for StaticCatalog {
    async fn latest_version(&self, device_type: DeviceType) -> Result<Option<Version>> {
        Ok(self.versions.get(&device_type).cloned())
    }
}

/// `latest` if it is strictly newer than `current`.
pub fn newer_version(current: Option<&Version>, latest: Option<Version>) -> Option<Version> {
    match (current, latest) {
        (Some(current), Some(latest)) if latest > *current => Some(latest),
        _ => None,
    }
}

/// Ask `catalog` whether a newer firmware than `current` exists.
pub async fn check_for_update(
    catalog: Option<&dyn FirmwareCatalog>,
    device_type: DeviceType,
    current: Option<Version>,
) -> Option<Version> {
    let Some(catalog) = catalog else {
        debug!(%device_type, "No firmware catalog configured");
        return None;
    };
    let Some(current) = current else {
        debug!(%device_type, "Firmware version unknown, skipping update check");
        return None;
    };
    match catalog.latest_version(device_type).await {
        Ok(latest) => newer_version(Some(&current), latest),
        Err(e) => {
            warn!(%device_type, error = %e, "Firmware catalog lookup failed");
            None
        }
    }
}
