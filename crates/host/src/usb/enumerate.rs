//! Mass-storage device discovery
//!
//! Walks the host's attached devices, applies the configured VID:PID filter,
//! and builds one uninitialized [`Session`] per matched interface. A device
//! exposing several mass-storage functions yields several sessions.

use crate::usb::backend::{UsbHost, UsbHostError};
use crate::usb::matcher::match_interface;
use crate::usb::session::Session;
use tracing::{debug, info};

/// VID:PID allow-list for discovery
///
/// Filters use the format `"0xVID:0xPID"` where either side may be `"*"`.
/// An empty list allows every device. Patterns are validated by the config
/// loader; a malformed pattern matches nothing.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    filters: Vec<String>,
}

impl DeviceFilter {
    /// Create a filter from a list of VID:PID patterns
    pub fn new(filters: Vec<String>) -> Self {
        Self { filters }
    }

    /// Create a filter that allows every device
    pub fn allow_all() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Check if a VID/PID pair is allowed by the filters
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        // If no filters are defined, all devices are allowed
        if self.filters.is_empty() {
            return true;
        }

        for filter in &self.filters {
            let parts: Vec<&str> = filter.split(':').collect();
            if parts.len() != 2 {
                continue;
            }

            let filter_vid_str = parts[0];
            let filter_pid_str = parts[1];

            let vid_match = if filter_vid_str == "*" {
                true
            } else {
                u16::from_str_radix(filter_vid_str.trim_start_matches("0x"), 16)
                    .map(|v| v == vid)
                    .unwrap_or(false)
            };

            if !vid_match {
                continue;
            }

            let pid_match = if filter_pid_str == "*" {
                true
            } else {
                u16::from_str_radix(filter_pid_str.trim_start_matches("0x"), 16)
                    .map(|p| p == pid)
                    .unwrap_or(false)
            };

            if pid_match {
                return true;
            }
        }

        false
    }
}

/// Discover mass-storage devices attached to the host
///
/// Returns one uninitialized session per matched interface, in the order the
/// host enumerates devices. Devices rejected by the filter and interfaces
/// that fail the mass-storage match are skipped silently at this level;
/// only backend enumeration failures surface as errors.
pub fn discover(host: &dyn UsbHost, filter: &DeviceFilter) -> Result<Vec<Session>, UsbHostError> {
    let discovered = host.devices()?;
    let mut sessions = Vec::new();

    for entry in discovered {
        if !filter.matches(entry.device.vendor_id, entry.device.product_id) {
            debug!("Device {} filtered out", entry.device);
            continue;
        }

        for interface in &entry.interfaces {
            if let Some(endpoints) = match_interface(interface) {
                info!(
                    "Found mass-storage device {} (interface {})",
                    entry.device, interface.number
                );
                sessions.push(Session::new(
                    entry.device.clone(),
                    interface.clone(),
                    endpoints,
                ));
            }
        }
    }

    debug!("Discovery produced {} sessions", sessions.len());
    Ok(sessions)
}
