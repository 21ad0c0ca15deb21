//! USB host backend abstraction
//!
//! This module defines the trait seam between the session layer and the OS
//! USB stack: enumeration, permission checks, and the per-connection
//! operations (claim/release, control and bulk transfers, close). The
//! production implementation lives in [`crate::usb::rusb_backend`]; scripted
//! mock implementations for tests live in [`crate::testing`].

use descriptors::{DeviceInfo, InterfaceInfo};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// USB host error types
///
/// Maps to libusb error codes. See rusb::Error for details.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum UsbHostError {
    /// Transfer timed out
    #[error("Transfer timed out")]
    Timeout,
    /// Endpoint stalled (protocol error)
    #[error("Endpoint stalled")]
    Pipe,
    /// Device was disconnected
    #[error("Device was disconnected")]
    NoDevice,
    /// Device or endpoint not found
    #[error("Device or endpoint not found")]
    NotFound,
    /// Device is busy
    #[error("Device is busy")]
    Busy,
    /// Buffer overflow
    #[error("Buffer overflow")]
    Overflow,
    /// I/O error
    #[error("I/O error")]
    Io,
    /// Invalid parameter
    #[error("Invalid parameter")]
    InvalidParam,
    /// Access denied (permissions)
    #[error("Access denied")]
    Access,
    /// Other error with message
    #[error("USB error: {message}")]
    Other { message: String },
}

/// Type alias for backend results
pub type Result<T> = std::result::Result<T, UsbHostError>;

/// One attached device together with its interface descriptors
///
/// Interfaces are listed flat, one entry per alternate setting, in the order
/// the descriptors appear on the wire.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Device identity and descriptor fields
    pub device: DeviceInfo,
    /// All interface descriptors of the active configuration
    pub interfaces: Vec<InterfaceInfo>,
}

/// OS USB subsystem collaborator
///
/// Supplies the attached-device list, answers permission queries, and opens
/// connections. Enumeration order is the order the OS reports; callers must
/// not assume any particular sorting.
pub trait UsbHost {
    /// List all currently attached devices with their interface descriptors
    ///
    /// An empty list means no device is attached; that is not an error.
    fn devices(&self) -> Result<Vec<DiscoveredDevice>>;

    /// Whether the caller may communicate with the given device
    fn has_permission(&self, device: &DeviceInfo) -> bool;

    /// Open a connection to the given device
    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn UsbConnection>>;
}

/// An open connection to one USB device
///
/// All operations are blocking and complete or fail before returning. After
/// [`close`](UsbConnection::close) every I/O method fails with
/// [`UsbHostError::NoDevice`].
pub trait UsbConnection: Send {
    /// Claim an interface exclusively
    ///
    /// With `force` set, a kernel driver bound to the interface is detached
    /// first so the claim can succeed.
    fn claim_interface(&mut self, interface: u8, force: bool) -> Result<()>;

    /// Release a previously claimed interface
    fn release_interface(&mut self, interface: u8) -> Result<()>;

    /// Device-to-host control transfer on endpoint 0
    ///
    /// Returns the number of bytes the device actually sent.
    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize>;

    /// Read from a bulk IN endpoint
    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write to a bulk OUT endpoint
    fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Close the connection
    ///
    /// Idempotent; a second close is a no-op.
    fn close(&mut self);
}
