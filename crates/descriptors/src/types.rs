//! USB identity type definitions
//!
//! This module defines the descriptor-level types a session is identified by:
//! device, interface, and endpoint information as read from the USB
//! descriptors during enumeration. All of them are plain data and serialize
//! with postcard; none of them hold OS resources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device information gathered during enumeration
///
/// Contains the device-descriptor fields needed to identify a physical
/// device and find it again on a later enumeration pass. String descriptors
/// are read best-effort and may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number on the host
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Manufacturer string (if available)
    pub manufacturer: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Serial number string (if available)
    pub serial_number: Option<String>,
    /// USB device class
    pub class: u8,
    /// USB device subclass
    pub subclass: u8,
    /// USB device protocol
    pub protocol: u8,
    /// Device speed (USB 1.0, 2.0, 3.0, etc.)
    pub speed: DeviceSpeed,
    /// Number of configurations
    pub num_configurations: u8,
}

impl DeviceInfo {
    /// Check whether this describes the same physical device as `other`
    ///
    /// Bus number and address pin down the port; vendor and product IDs guard
    /// against a different device re-enumerating at the same address.
    pub fn same_device(&self, other: &DeviceInfo) -> bool {
        self.bus_number == other.bus_number
            && self.device_address == other.device_address
            && self.vendor_id == other.vendor_id
            && self.product_id == other.product_id
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (bus {:03} addr {:03})",
            self.vendor_id, self.product_id, self.bus_number, self.device_address
        )
    }
}

/// USB device speed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceSpeed {
    /// Low speed - 1.5 Mbps (USB 1.0)
    Low,
    /// Full speed - 12 Mbps (USB 1.1)
    Full,
    /// High speed - 480 Mbps (USB 2.0)
    High,
    /// SuperSpeed - 5 Gbps (USB 3.0)
    Super,
    /// SuperSpeed+ - 10 Gbps (USB 3.1)
    SuperPlus,
}

/// One interface (alternate setting) of a device
///
/// Interfaces are enumerated flat: each alternate setting appears as its own
/// `InterfaceInfo`, mirroring how the descriptors are laid out on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Interface number (bInterfaceNumber) - the claim target
    pub number: u8,
    /// Alternate setting (bAlternateSetting)
    pub alternate_setting: u8,
    /// Interface class code
    pub class: u8,
    /// Interface subclass code
    pub subclass: u8,
    /// Interface protocol code
    pub protocol: u8,
    /// Endpoints declared by this interface, in descriptor order
    pub endpoints: Vec<EndpointInfo>,
}

/// One endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Endpoint address (bEndpointAddress); bit 7 encodes the direction
    pub address: u8,
    /// Transfer kind from bmAttributes
    pub transfer: TransferKind,
    /// Maximum packet size (wMaxPacketSize)
    pub max_packet_size: u16,
}

impl EndpointInfo {
    /// Direction of this endpoint, derived from the address
    pub fn direction(&self) -> EndpointDirection {
        // Bit 7 of bEndpointAddress: 1 = IN (device-to-host)
        if self.address & 0x80 != 0 {
            EndpointDirection::In
        } else {
            EndpointDirection::Out
        }
    }

    /// Whether this is a bulk endpoint
    pub fn is_bulk(&self) -> bool {
        self.transfer == TransferKind::Bulk
    }
}

/// Endpoint transfer kind (bmAttributes bits 0-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Control transfers (endpoint 0)
    Control,
    /// Isochronous streaming
    Isochronous,
    /// Bulk transfers
    Bulk,
    /// Interrupt transfers
    Interrupt,
}

/// Endpoint direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointDirection {
    /// Host-to-device
    Out,
    /// Device-to-host
    In,
}

/// The bulk endpoint pair selected from a matched interface
///
/// Invariant: both endpoints are bulk, `bulk_in` has IN direction and
/// `bulk_out` has OUT direction. The matcher is the only producer and rejects
/// interfaces where either endpoint is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPair {
    /// Bulk endpoint with IN direction (device-to-host)
    pub bulk_in: EndpointInfo,
    /// Bulk endpoint with OUT direction (host-to-device)
    pub bulk_out: EndpointInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_direction_from_address() {
        let ep_in = EndpointInfo {
            address: 0x81,
            transfer: TransferKind::Bulk,
            max_packet_size: 512,
        };
        let ep_out = EndpointInfo {
            address: 0x02,
            transfer: TransferKind::Bulk,
            max_packet_size: 512,
        };

        assert_eq!(ep_in.direction(), EndpointDirection::In);
        assert_eq!(ep_out.direction(), EndpointDirection::Out);
    }

    #[test]
    fn test_endpoint_is_bulk() {
        let bulk = EndpointInfo {
            address: 0x81,
            transfer: TransferKind::Bulk,
            max_packet_size: 512,
        };
        let interrupt = EndpointInfo {
            address: 0x83,
            transfer: TransferKind::Interrupt,
            max_packet_size: 8,
        };

        assert!(bulk.is_bulk());
        assert!(!interrupt.is_bulk());
    }

    #[test]
    fn test_same_device() {
        let a = DeviceInfo {
            vendor_id: 0x1234,
            product_id: 0x5678,
            bus_number: 1,
            device_address: 5,
            manufacturer: None,
            product: None,
            serial_number: None,
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: DeviceSpeed::High,
            num_configurations: 1,
        };
        let mut b = a.clone();
        assert!(a.same_device(&b));

        b.device_address = 6;
        assert!(!a.same_device(&b));

        b.device_address = 5;
        b.product_id = 0x9999;
        assert!(!a.same_device(&b));
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            vendor_id: 0x0781,
            product_id: 0x5567,
            bus_number: 1,
            device_address: 4,
            manufacturer: None,
            product: None,
            serial_number: None,
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: DeviceSpeed::High,
            num_configurations: 1,
        };

        assert_eq!(info.to_string(), "0781:5567 (bus 001 addr 004)");
    }
}
