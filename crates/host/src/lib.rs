//! USB mass-storage host for rust-usb-msd
//!
//! This crate discovers attached USB mass-storage devices, claims their
//! bulk-only interfaces exclusively, and manages the session lifecycle from
//! discovery through setup to release. The storage layer turns the claimed
//! interface into a byte transport, a block device, and a partition table.
//!
//! Sessions serialize to identity records (see the `descriptors` crate);
//! a deserialized session never carries live OS resources and always starts
//! uninitialized.

pub mod config;
pub mod logging;
pub mod storage;
pub mod testing;
pub mod usb;

pub use config::{HostConfig, load_config};
pub use logging::setup_logging;
pub use storage::{
    BlockDevice, BlockDeviceFactory, BulkTransport, ByteTransport, MbrReader, NullBlockFactory,
    Partition, PartitionTableFactory, SharedConnection, StorageError,
};
pub use usb::{
    CloseReport, DeviceFilter, DiscoveredDevice, RusbHost, Session, SessionError, SessionState,
    UsbConnection, UsbHost, UsbHostError, discover, match_interface,
};
