//! Block device abstraction
//!
//! A block device driver turns the raw byte transport into addressable
//! block reads and writes. Drivers are created through a factory so the
//! session stays independent of the concrete command set.

use crate::storage::transport::ByteTransport;
use crate::usb::backend::UsbHostError;
use thiserror::Error;

/// Storage-layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transfer-level failure from the USB backend
    #[error("USB transfer error: {0}")]
    Io(#[from] UsbHostError),

    /// No registered reader recognized the partition table
    #[error("Unsupported partition table")]
    UnsupportedTable,

    /// The partition table was recognized but malformed
    #[error("Invalid partition table: {reason}")]
    InvalidTable { reason: String },

    /// The block device does not support the operation
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: &'static str },
}

/// A block-addressable storage device
///
/// `init` must be called once before any block access; it is where a driver
/// runs its device setup sequence and learns the geometry.
pub trait BlockDevice: Send {
    /// Initialize the device and read its geometry
    fn init(&mut self) -> Result<(), StorageError>;

    /// Size of one block in bytes
    fn block_size(&self) -> u32;

    /// Total number of blocks on the device
    fn block_count(&self) -> u64;

    /// Read whole blocks starting at `lba` into `buf`
    ///
    /// `buf` length must be a multiple of the block size.
    fn read_blocks(&mut self, lba: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write whole blocks starting at `lba` from `data`
    ///
    /// `data` length must be a multiple of the block size.
    fn write_blocks(&mut self, lba: u64, data: &[u8]) -> Result<(), StorageError>;
}

/// Factory producing a block device driver over a byte transport
pub trait BlockDeviceFactory {
    /// Create a driver for the device behind `transport`
    fn create(&self, transport: Box<dyn ByteTransport>) -> Result<Box<dyn BlockDevice>, StorageError>;
}

/// Block device that accepts initialization and nothing else
///
/// Used when a caller only needs the claim-and-setup part of a session, such
/// as the probe mode of the CLI, without speaking any storage command set.
pub struct NullBlockDevice;

impl BlockDevice for NullBlockDevice {
    fn init(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn block_size(&self) -> u32 {
        512
    }

    fn block_count(&self) -> u64 {
        0
    }

    fn read_blocks(&mut self, _lba: u64, _buf: &mut [u8]) -> Result<(), StorageError> {
        Err(StorageError::Unsupported {
            operation: "read_blocks",
        })
    }

    fn write_blocks(&mut self, _lba: u64, _data: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Unsupported {
            operation: "write_blocks",
        })
    }
}

/// Factory for [`NullBlockDevice`]
pub struct NullBlockFactory;

impl BlockDeviceFactory for NullBlockFactory {
    fn create(
        &self,
        _transport: Box<dyn ByteTransport>,
    ) -> Result<Box<dyn BlockDevice>, StorageError> {
        Ok(Box::new(NullBlockDevice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_block_device_init() {
        let mut device = NullBlockDevice;
        assert!(device.init().is_ok());
        assert_eq!(device.block_size(), 512);
        assert_eq!(device.block_count(), 0);
    }

    #[test]
    fn test_null_block_device_rejects_io() {
        let mut device = NullBlockDevice;
        let mut buf = [0u8; 512];

        assert!(matches!(
            device.read_blocks(0, &mut buf),
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            device.write_blocks(0, &buf),
            Err(StorageError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::InvalidTable {
            reason: "entry 2 overlaps entry 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid partition table: entry 2 overlaps entry 1"
        );

        let err = StorageError::Io(UsbHostError::Timeout);
        assert_eq!(err.to_string(), "USB transfer error: Transfer timed out");
    }
}
