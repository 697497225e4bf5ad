//! Device acquisition
//!
//! Scans once and picks the first advertiser whose name contains the target
//! substring. There is no best-match ranking and no retry.

use std::time::Duration;
use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::transport::{Central, DiscoveredDevice};

/// Slack on top of the scan window before the scan is abandoned
pub const SCAN_DEADLINE_GRACE: Duration = Duration::from_secs(2);

/// Finds the target peripheral among advertising devices
pub struct DeviceLocator<'a> {
    central: &'a dyn Central,
}

impl<'a> DeviceLocator<'a> {
    /// Create a locator scanning through `central`
    pub fn new(central: &'a dyn Central) -> Self {
        Self { central }
    }

    /// Scan and return the first device whose name contains `target_name`
    ///
    /// With an explicit `timeout` the scan is also bounded by a hard deadline
    /// of `timeout + SCAN_DEADLINE_GRACE`; a scan that overruns it counts as
    /// finding nothing.
    pub async fn discover(
        &self,
        target_name: &str,
        timeout: Option<Duration>,
    ) -> Result<DiscoveredDevice> {
        info!(target_name, central = self.central.name(), "Scanning for device");

        let devices = match timeout {
            Some(limit) => {
                tokio::time::timeout(limit + SCAN_DEADLINE_GRACE, self.central.scan(Some(limit)))
                    .await
                    .unwrap_or_else(|_| {
                        debug!(timeout = ?limit, "Scan overran its window");
                        Ok(Vec::new())
                    })?
            }
            None => self.central.scan(None).await?,
        };
        debug!(count = devices.len(), "Scan complete");

        match select_device(devices, target_name) {
            Some(device) => {
                info!(
                    name = device.name.as_deref().unwrap_or_default(),
                    address = %device.address,
                    "Found device"
                );
                Ok(device)
            }
            None => {
                info!(target_name, "Device not found");
                Err(LinkError::DeviceNotFound {
                    target: target_name.to_string(),
                })
            }
        }
    }
}

/// First device whose advertised name contains `target_name`
///
/// Matching is case-sensitive; unnamed devices never match.
pub fn select_device(
    devices: impl IntoIterator<Item = DiscoveredDevice>,
    target_name: &str,
) -> Option<DiscoveredDevice> {
    devices.into_iter().find(|d| {
        d.name
            .as_deref()
            .is_some_and(|name| name.contains(target_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: Option<&str>, address: &str) -> DiscoveredDevice {
        DiscoveredDevice::new(name, address)
    }

    #[test]
    fn test_select_second_device() {
        let devices = vec![
            device(Some("Other"), "00:01"),
            device(Some("FilmMate Tripod Pro"), "00:02"),
        ];
        let found = select_device(devices, "FilmMate Tripod").unwrap();
        assert_eq!(found.address, "00:02");
    }

    #[test]
    fn test_first_match_wins() {
        let devices = vec![
            device(Some("FilmMate Tripod A"), "00:01"),
            device(Some("FilmMate Tripod"), "00:02"),
        ];
        let found = select_device(devices, "FilmMate Tripod").unwrap();
        assert_eq!(found.address, "00:01");
    }

    #[test]
    fn test_unnamed_devices_skipped() {
        let devices = vec![device(None, "00:01"), device(Some("FilmMate Tripod"), "00:02")];
        assert_eq!(select_device(devices, "").unwrap().address, "00:02");
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let devices = vec![device(Some("filmmate tripod"), "00:01")];
        assert!(select_device(devices, "FilmMate Tripod").is_none());
    }

    #[test]
    fn test_no_devices() {
        assert!(select_device(Vec::new(), "FilmMate Tripod").is_none());
    }
}
