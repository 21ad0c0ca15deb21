//! Byte transport over a claimed bulk endpoint pair
//!
//! The session hands its open connection to the storage layer through
//! [`BulkTransport`], which moves raw bytes over the matched bulk IN/OUT
//! endpoints. Block device drivers see only the [`ByteTransport`] trait and
//! stay independent of the USB backend.

use crate::usb::backend::{UsbConnection, UsbHostError};
use descriptors::EndpointPair;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Default timeout for bulk transfers (5 seconds)
const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection shared between the session and its transport
///
/// The session keeps one handle for interface release on close; each
/// transport clone keeps another for transfers.
pub type SharedConnection = Arc<Mutex<Box<dyn UsbConnection>>>;

/// Lock a shared connection, mapping a poisoned lock to a transfer error
pub(crate) fn lock_connection(
    connection: &SharedConnection,
) -> Result<MutexGuard<'_, Box<dyn UsbConnection>>, UsbHostError> {
    connection.lock().map_err(|_| UsbHostError::Other {
        message: "connection lock poisoned".to_string(),
    })
}

/// Raw byte stream to and from a storage device
///
/// Reads fill the caller's buffer from the device; writes send the caller's
/// bytes to the device. Both return the number of bytes actually moved.
pub trait ByteTransport: Send {
    /// Read bytes from the device into `buf`
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, UsbHostError>;

    /// Write bytes from `data` to the device
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, UsbHostError>;
}

/// Byte transport over the bulk endpoint pair of a claimed interface
#[derive(Clone)]
pub struct BulkTransport {
    connection: SharedConnection,
    endpoints: EndpointPair,
    timeout: Duration,
}

impl BulkTransport {
    /// Create a transport over an open connection and its matched endpoints
    pub fn new(connection: SharedConnection, endpoints: EndpointPair) -> Self {
        Self {
            connection,
            endpoints,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }

    /// Create a transport with a custom transfer timeout
    pub fn with_timeout(
        connection: SharedConnection,
        endpoints: EndpointPair,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            endpoints,
            timeout,
        }
    }

    /// Change the transfer timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// The endpoint pair this transport moves bytes over
    pub fn endpoints(&self) -> EndpointPair {
        self.endpoints
    }
}

impl ByteTransport for BulkTransport {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, UsbHostError> {
        let endpoint = self.endpoints.bulk_in.address;
        debug!("Bulk IN: endpoint={:#x}, len={}", endpoint, buf.len());
        lock_connection(&self.connection)?.bulk_in(endpoint, buf, self.timeout)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, UsbHostError> {
        let endpoint = self.endpoints.bulk_out.address;
        debug!("Bulk OUT: endpoint={:#x}, len={}", endpoint, data.len());
        lock_connection(&self.connection)?.bulk_out(endpoint, data, self.timeout)
    }
}
