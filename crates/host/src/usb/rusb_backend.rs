//! rusb-backed USB host implementation
//!
//! Wraps a `rusb::Context` behind the [`UsbHost`] trait: walks the attached
//! devices, harvests device/interface/endpoint descriptors into the
//! serializable identity types, and hands out [`RusbConnection`] handles for
//! claimed transfers.

use crate::usb::backend::{DiscoveredDevice, Result, UsbConnection, UsbHost, UsbHostError};
use descriptors::{DeviceInfo, DeviceSpeed, EndpointInfo, InterfaceInfo, TransferKind};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// USB host backed by a libusb context
pub struct RusbHost {
    context: Context,
}

impl RusbHost {
    /// Create a new host over a fresh libusb context
    pub fn new() -> Result<Self> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self { context })
    }

    /// Find the physical device matching the given identity
    ///
    /// Bus number and address locate the port; vendor and product IDs guard
    /// against a different device having re-enumerated at the same address.
    fn find_device(&self, info: &DeviceInfo) -> Result<Device<Context>> {
        let devices = self.context.devices().map_err(map_rusb_error)?;

        for device in devices.iter() {
            if device.bus_number() != info.bus_number || device.address() != info.device_address {
                continue;
            }
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    debug!(
                        "Could not read descriptor for bus={} addr={}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };
            if descriptor.vendor_id() == info.vendor_id
                && descriptor.product_id() == info.product_id
            {
                return Ok(device);
            }
        }

        Err(UsbHostError::NotFound)
    }

    /// Build the identity record for one attached device
    ///
    /// Reads string descriptors (manufacturer, product, serial) best-effort
    /// through a temporary open; devices we cannot open simply carry no
    /// strings.
    fn device_info(device: &Device<Context>, descriptor: &DeviceDescriptor) -> DeviceInfo {
        let strings = device
            .open()
            .ok()
            .map(|handle| read_string_descriptors(&handle, descriptor));

        let (manufacturer, product, serial_number) = strings.unwrap_or((None, None, None));

        DeviceInfo {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus_number: device.bus_number(),
            device_address: device.address(),
            manufacturer,
            product,
            serial_number,
            class: descriptor.class_code(),
            subclass: descriptor.sub_class_code(),
            protocol: descriptor.protocol_code(),
            speed: map_device_speed(device.speed()),
            num_configurations: descriptor.num_configurations(),
        }
    }

    /// Flatten the active configuration into interface descriptors
    ///
    /// Every alternate setting appears as its own entry, in wire order.
    fn interface_list(device: &Device<Context>) -> rusb::Result<Vec<InterfaceInfo>> {
        let config = device.active_config_descriptor()?;
        let mut interfaces = Vec::new();

        for interface in config.interfaces() {
            for setting in interface.descriptors() {
                let endpoints = setting
                    .endpoint_descriptors()
                    .map(|endpoint| EndpointInfo {
                        address: endpoint.address(),
                        transfer: map_transfer_type(endpoint.transfer_type()),
                        max_packet_size: endpoint.max_packet_size(),
                    })
                    .collect();

                interfaces.push(InterfaceInfo {
                    number: setting.interface_number(),
                    alternate_setting: setting.setting_number(),
                    class: setting.class_code(),
                    subclass: setting.sub_class_code(),
                    protocol: setting.protocol_code(),
                    endpoints,
                });
            }
        }

        Ok(interfaces)
    }
}

impl UsbHost for RusbHost {
    fn devices(&self) -> Result<Vec<DiscoveredDevice>> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        let mut discovered = Vec::new();

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        "Skipping device bus={} addr={}: descriptor read failed: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            let interfaces = match Self::interface_list(&device) {
                Ok(list) => list,
                Err(e) => {
                    debug!(
                        "Skipping device bus={} addr={}: config descriptor read failed: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            discovered.push(DiscoveredDevice {
                device: Self::device_info(&device, &descriptor),
                interfaces,
            });
        }

        debug!("Enumerated {} devices", discovered.len());
        Ok(discovered)
    }

    fn has_permission(&self, device: &DeviceInfo) -> bool {
        // There is no separate permission broker on a libusb host; being able
        // to open the device is the operative precondition.
        match self.find_device(device) {
            Ok(dev) => dev.open().is_ok(),
            Err(_) => false,
        }
    }

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn UsbConnection>> {
        let dev = self.find_device(device)?;
        let handle = dev.open().map_err(|e| {
            warn!("Failed to open device {}: {}", device, e);
            map_rusb_error(e)
        })?;

        debug!("Opened device {}", device);
        Ok(Box::new(RusbConnection {
            handle: Some(handle),
            claimed: Vec::new(),
            detached: Vec::new(),
        }))
    }
}

/// An open libusb device handle
///
/// Tracks which interfaces we claimed and which kernel drivers we detached so
/// close can hand the device back to the kernel in the state we found it.
pub struct RusbConnection {
    /// Underlying handle; None after close
    handle: Option<DeviceHandle<Context>>,
    /// Interfaces claimed through this connection
    claimed: Vec<u8>,
    /// Interfaces whose kernel driver we detached
    detached: Vec<u8>,
}

impl RusbConnection {
    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>> {
        self.handle.as_mut().ok_or(UsbHostError::NoDevice)
    }
}

impl UsbConnection for RusbConnection {
    fn claim_interface(&mut self, interface: u8, force: bool) -> Result<()> {
        let detached = &mut self.detached;
        let handle = self.handle.as_mut().ok_or(UsbHostError::NoDevice)?;

        if force {
            match handle.kernel_driver_active(interface) {
                Ok(true) => {
                    debug!("Detaching kernel driver from interface {}", interface);
                    match handle.detach_kernel_driver(interface) {
                        Ok(()) => detached.push(interface),
                        Err(e) => {
                            // Claiming will most likely fail next, but let the
                            // claim itself report the error.
                            warn!(
                                "Failed to detach kernel driver from interface {}: {}",
                                interface, e
                            );
                        }
                    }
                }
                Ok(false) => {
                    debug!("No kernel driver active on interface {}", interface);
                }
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        interface, e
                    );
                }
            }
        }

        handle.claim_interface(interface).map_err(|e| {
            warn!("Failed to claim interface {}: {}", interface, e);
            map_rusb_error(e)
        })?;

        debug!("Claimed interface {}", interface);
        self.claimed.push(interface);
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(UsbHostError::NoDevice)?;

        handle.release_interface(interface).map_err(map_rusb_error)?;
        self.claimed.retain(|&n| n != interface);

        if self.detached.contains(&interface) {
            reattach_kernel_driver(handle, interface);
            self.detached.retain(|&n| n != interface);
        }

        debug!("Released interface {}", interface);
        Ok(())
    }

    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        debug!(
            "Control IN: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, len={}",
            request_type,
            request,
            value,
            index,
            buf.len()
        );
        self.handle_mut()?
            .read_control(request_type, request, value, index, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle_mut()?
            .read_bulk(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        self.handle_mut()?
            .write_bulk(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }

    fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            // Release anything still claimed so the kernel gets the device
            // back even if the caller skipped release_interface.
            for interface in self.claimed.drain(..) {
                if let Err(e) = handle.release_interface(interface) {
                    warn!("Failed to release interface {}: {}", interface, e);
                }
            }
            for interface in self.detached.drain(..) {
                reattach_kernel_driver(&mut handle, interface);
            }
            debug!("Closed device connection");
        }
    }
}

/// Read string descriptors from a device
fn read_string_descriptors(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> (Option<String>, Option<String>, Option<String>) {
    let manufacturer = descriptor
        .manufacturer_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let product = descriptor
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let serial_number = descriptor
        .serial_number_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    (manufacturer, product, serial_number)
}

/// Reattach the kernel driver to an interface we detached it from
fn reattach_kernel_driver(handle: &mut DeviceHandle<Context>, interface: u8) {
    match handle.attach_kernel_driver(interface) {
        Ok(()) => debug!("Reattached kernel driver to interface {}", interface),
        Err(e) => debug!(
            "Could not reattach kernel driver to interface {} (may not have been detached): {}",
            interface, e
        ),
    }
}

/// Map rusb device speed to DeviceSpeed
fn map_device_speed(speed: rusb::Speed) -> DeviceSpeed {
    match speed {
        rusb::Speed::Low => DeviceSpeed::Low,
        rusb::Speed::Full => DeviceSpeed::Full,
        rusb::Speed::High => DeviceSpeed::High,
        rusb::Speed::Super => DeviceSpeed::Super,
        rusb::Speed::SuperPlus => DeviceSpeed::SuperPlus,
        _ => DeviceSpeed::Full, // Default fallback
    }
}

/// Map rusb endpoint transfer type to TransferKind
fn map_transfer_type(transfer: rusb::TransferType) -> TransferKind {
    match transfer {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

/// Map rusb::Error to UsbHostError
///
/// This provides a clean mapping from low-level rusb errors to host-level
/// errors that the session layer can classify.
pub fn map_rusb_error(err: rusb::Error) -> UsbHostError {
    match err {
        rusb::Error::Timeout => UsbHostError::Timeout,
        rusb::Error::Pipe => UsbHostError::Pipe,
        rusb::Error::NoDevice => UsbHostError::NoDevice,
        rusb::Error::NotFound => UsbHostError::NotFound,
        rusb::Error::Busy => UsbHostError::Busy,
        rusb::Error::Overflow => UsbHostError::Overflow,
        rusb::Error::Io => UsbHostError::Io,
        rusb::Error::InvalidParam => UsbHostError::InvalidParam,
        rusb::Error::Access => UsbHostError::Access,
        _ => UsbHostError::Other {
            message: err.to_string(),
        },
    }
}
