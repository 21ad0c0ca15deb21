//! Test utilities for rust-usb-msd
//!
//! Provides mock implementations of the USB backend and storage traits plus
//! helper constructors for descriptor values. The mock host records every
//! connection call it sees, so tests can assert on the exact setup and
//! teardown sequence.
//!
//! # Example
//!
//! ```
//! use host::testing::{MockHost, create_bulk_only_interface, create_mock_device_info};
//! use host::usb::UsbHost;
//!
//! let host = MockHost::new().with_device(
//!     create_mock_device_info(0x0781, 0x5567, 4),
//!     vec![create_bulk_only_interface(0)],
//! );
//! assert_eq!(host.devices().unwrap().len(), 1);
//! ```

use crate::storage::block::{BlockDevice, BlockDeviceFactory, StorageError};
use crate::usb::backend::{DiscoveredDevice, Result, UsbConnection, UsbHost, UsbHostError};
use descriptors::{DeviceInfo, DeviceSpeed, EndpointInfo, InterfaceInfo, TransferKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded call on a mock connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// The host opened a connection
    Open,
    /// `claim_interface` was called
    ClaimInterface { interface: u8, force: bool },
    /// `release_interface` was called
    ReleaseInterface { interface: u8 },
    /// `control_in` was called
    ControlIn {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    },
    /// `bulk_in` was called
    BulkIn { endpoint: u8, length: usize },
    /// `bulk_out` was called
    BulkOut { endpoint: u8, data: Vec<u8> },
    /// `close` was called
    CloseConnection,
}

/// Configured behavior shared by a mock host and its connections
#[derive(Debug, Clone)]
struct MockBehavior {
    permission: bool,
    fail_open: bool,
    fail_claim: bool,
    fail_release: bool,
    fail_control_in: bool,
    max_lun: u8,
    bulk_in_data: Vec<u8>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            permission: true,
            fail_open: false,
            fail_claim: false,
            fail_release: false,
            fail_control_in: false,
            max_lun: 0,
            bulk_in_data: Vec::new(),
        }
    }
}

/// Mock USB host with scripted devices and failures
///
/// Built with the builder methods, then handed to discovery or session code
/// as `&dyn UsbHost`. All connections opened by the host share one call log;
/// [`MockHost::calls`] returns a snapshot of it.
#[derive(Debug, Default)]
pub struct MockHost {
    devices: Vec<DiscoveredDevice>,
    behavior: MockBehavior,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockHost {
    /// Create a mock host with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device with the given interfaces
    pub fn with_device(mut self, device: DeviceInfo, interfaces: Vec<InterfaceInfo>) -> Self {
        self.devices.push(DiscoveredDevice { device, interfaces });
        self
    }

    /// Make permission checks fail for every device
    pub fn deny_permission(mut self) -> Self {
        self.behavior.permission = false;
        self
    }

    /// Make `open` fail
    pub fn fail_open(mut self) -> Self {
        self.behavior.fail_open = true;
        self
    }

    /// Make `claim_interface` fail
    pub fn fail_claim(mut self) -> Self {
        self.behavior.fail_claim = true;
        self
    }

    /// Make `release_interface` fail
    pub fn fail_release(mut self) -> Self {
        self.behavior.fail_release = true;
        self
    }

    /// Make `control_in` fail
    pub fn fail_control_in(mut self) -> Self {
        self.behavior.fail_control_in = true;
        self
    }

    /// Set the Max LUN byte returned by `control_in`
    pub fn with_max_lun(mut self, max_lun: u8) -> Self {
        self.behavior.max_lun = max_lun;
        self
    }

    /// Set the bytes returned by bulk IN transfers
    pub fn with_bulk_in_data(mut self, data: Vec<u8>) -> Self {
        self.behavior.bulk_in_data = data;
        self
    }

    /// Snapshot of all recorded connection calls, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().expect("call log lock poisoned").clone()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().expect("call log lock poisoned").push(call);
    }
}

impl UsbHost for MockHost {
    fn devices(&self) -> Result<Vec<DiscoveredDevice>> {
        Ok(self.devices.clone())
    }

    fn has_permission(&self, _device: &DeviceInfo) -> bool {
        self.behavior.permission
    }

    fn open(&self, _device: &DeviceInfo) -> Result<Box<dyn UsbConnection>> {
        self.record(MockCall::Open);
        if self.behavior.fail_open {
            return Err(UsbHostError::Io);
        }
        Ok(Box::new(MockConnection {
            behavior: self.behavior.clone(),
            calls: Arc::clone(&self.calls),
            open: true,
        }))
    }
}

/// Connection produced by [`MockHost::open`]
///
/// Records every call before acting on it, so failed calls appear in the log
/// too. Calls after `close` fail with [`UsbHostError::NoDevice`].
struct MockConnection {
    behavior: MockBehavior,
    calls: Arc<Mutex<Vec<MockCall>>>,
    open: bool,
}

impl MockConnection {
    fn record(&self, call: MockCall) {
        self.calls.lock().expect("call log lock poisoned").push(call);
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(UsbHostError::NoDevice)
        }
    }
}

impl UsbConnection for MockConnection {
    fn claim_interface(&mut self, interface: u8, force: bool) -> Result<()> {
        self.record(MockCall::ClaimInterface { interface, force });
        self.check_open()?;
        if self.behavior.fail_claim {
            return Err(UsbHostError::Busy);
        }
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<()> {
        self.record(MockCall::ReleaseInterface { interface });
        self.check_open()?;
        if self.behavior.fail_release {
            return Err(UsbHostError::Io);
        }
        Ok(())
    }

    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize> {
        self.record(MockCall::ControlIn {
            request_type,
            request,
            value,
            index,
            length: buf.len(),
        });
        self.check_open()?;
        if self.behavior.fail_control_in {
            return Err(UsbHostError::Pipe);
        }
        if let Some(first) = buf.first_mut() {
            *first = self.behavior.max_lun;
        }
        Ok(buf.len().min(1))
    }

    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        self.record(MockCall::BulkIn {
            endpoint,
            length: buf.len(),
        });
        self.check_open()?;
        let n = buf.len().min(self.behavior.bulk_in_data.len());
        buf[..n].copy_from_slice(&self.behavior.bulk_in_data[..n]);
        Ok(n)
    }

    fn bulk_out(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.record(MockCall::BulkOut {
            endpoint,
            data: data.to_vec(),
        });
        self.check_open()?;
        Ok(data.len())
    }

    fn close(&mut self) {
        self.record(MockCall::CloseConnection);
        self.open = false;
    }
}

/// Block device backed by an in-memory image
///
/// Rejects access before `init` and out-of-range block addresses, so tests
/// catch ordering and geometry mistakes.
pub struct MemoryBlockDevice {
    image: Arc<Mutex<Vec<u8>>>,
    block_size: u32,
    initialized: bool,
    fail_init: bool,
}

impl BlockDevice for MemoryBlockDevice {
    fn init(&mut self) -> std::result::Result<(), StorageError> {
        if self.fail_init {
            return Err(StorageError::Io(UsbHostError::Io));
        }
        self.initialized = true;
        Ok(())
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        let len = self.image.lock().expect("image lock poisoned").len();
        len as u64 / u64::from(self.block_size)
    }

    fn read_blocks(&mut self, lba: u64, buf: &mut [u8]) -> std::result::Result<(), StorageError> {
        if !self.initialized {
            return Err(StorageError::Unsupported {
                operation: "read_blocks before init",
            });
        }
        let image = self.image.lock().expect("image lock poisoned");
        let offset = (lba * u64::from(self.block_size)) as usize;
        let end = offset + buf.len();
        if end > image.len() {
            return Err(StorageError::Io(UsbHostError::Overflow));
        }
        buf.copy_from_slice(&image[offset..end]);
        Ok(())
    }

    fn write_blocks(&mut self, lba: u64, data: &[u8]) -> std::result::Result<(), StorageError> {
        if !self.initialized {
            return Err(StorageError::Unsupported {
                operation: "write_blocks before init",
            });
        }
        let mut image = self.image.lock().expect("image lock poisoned");
        let offset = (lba * u64::from(self.block_size)) as usize;
        let end = offset + data.len();
        if end > image.len() {
            return Err(StorageError::Io(UsbHostError::Overflow));
        }
        image[offset..end].copy_from_slice(data);
        Ok(())
    }
}

/// Factory producing [`MemoryBlockDevice`] drivers over a shared image
///
/// The image is shared between the factory and every device it creates;
/// [`MemoryBlockFactory::image`] lets a test mutate the medium between
/// reads.
pub struct MemoryBlockFactory {
    image: Arc<Mutex<Vec<u8>>>,
    block_size: u32,
    fail_init: bool,
}

impl MemoryBlockFactory {
    /// Create a factory over the given image bytes
    pub fn new(image: Vec<u8>, block_size: u32) -> Self {
        Self {
            image: Arc::new(Mutex::new(image)),
            block_size,
            fail_init: false,
        }
    }

    /// Make every created device fail its `init`
    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Shared handle to the image bytes
    pub fn image(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.image)
    }
}

impl BlockDeviceFactory for MemoryBlockFactory {
    fn create(
        &self,
        _transport: Box<dyn crate::storage::transport::ByteTransport>,
    ) -> std::result::Result<Box<dyn BlockDevice>, StorageError> {
        Ok(Box::new(MemoryBlockDevice {
            image: Arc::clone(&self.image),
            block_size: self.block_size,
            initialized: false,
            fail_init: self.fail_init,
        }))
    }
}

/// Create a byte transport over a fresh mock connection
///
/// For tests that need a transport to hand to a block device factory but do
/// not care about the bytes moving through it.
pub fn create_mock_transport() -> crate::storage::BulkTransport {
    let host = MockHost::new();
    let conn = host
        .open(&create_mock_device_info(0x1234, 0x5678, 1))
        .expect("mock open cannot fail");
    crate::storage::BulkTransport::new(
        Arc::new(Mutex::new(conn)),
        descriptors::EndpointPair {
            bulk_in: create_bulk_in_endpoint(0x81),
            bulk_out: create_bulk_out_endpoint(0x02),
        },
    )
}

/// Create a mock DeviceInfo for testing
///
/// # Example
/// ```
/// use host::testing::create_mock_device_info;
///
/// let device = create_mock_device_info(0x1234, 0x5678, 4);
/// assert_eq!(device.vendor_id, 0x1234);
/// assert_eq!(device.device_address, 4);
/// ```
pub fn create_mock_device_info(vendor_id: u16, product_id: u16, device_address: u8) -> DeviceInfo {
    DeviceInfo {
        vendor_id,
        product_id,
        bus_number: 1,
        device_address,
        manufacturer: Some("Test Manufacturer".to_string()),
        product: Some("Test Product".to_string()),
        serial_number: Some(format!("SN{:06}", device_address)),
        class: 0x00,
        subclass: 0x00,
        protocol: 0x00,
        speed: DeviceSpeed::High,
        num_configurations: 1,
    }
}

/// Create a bulk-only mass-storage interface with the standard endpoint pair
pub fn create_bulk_only_interface(number: u8) -> InterfaceInfo {
    InterfaceInfo {
        number,
        alternate_setting: 0,
        class: 0x08,
        subclass: 0x06,
        protocol: 0x50,
        endpoints: vec![create_bulk_in_endpoint(0x81), create_bulk_out_endpoint(0x02)],
    }
}

/// Create a bulk IN endpoint descriptor
pub fn create_bulk_in_endpoint(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer: TransferKind::Bulk,
        max_packet_size: 512,
    }
}

/// Create a bulk OUT endpoint descriptor
pub fn create_bulk_out_endpoint(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer: TransferKind::Bulk,
        max_packet_size: 512,
    }
}

/// Create an interrupt endpoint descriptor
pub fn create_interrupt_endpoint(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer: TransferKind::Interrupt,
        max_packet_size: 8,
    }
}

/// Build a 512-byte boot sector with the given partition entries
///
/// Entries are `(bootable, type_code, lba_start, sector_count)` tuples,
/// written in order starting at the first table slot. The MBR signature is
/// always present.
pub fn create_mbr_sector(entries: &[(bool, u8, u32, u32)]) -> Vec<u8> {
    let mut sector = vec![0u8; 512];
    sector[510] = 0x55;
    sector[511] = 0xAA;

    for (i, &(bootable, type_code, lba_start, sector_count)) in entries.iter().enumerate() {
        let offset = 446 + i * 16;
        sector[offset] = if bootable { 0x80 } else { 0x00 };
        sector[offset + 4] = type_code;
        sector[offset + 8..offset + 12].copy_from_slice(&lba_start.to_le_bytes());
        sector[offset + 12..offset + 16].copy_from_slice(&sector_count.to_le_bytes());
    }

    sector
}
