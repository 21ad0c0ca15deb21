//! Storage layer: byte transport, block devices, partition tables
//!
//! Sits between the claimed USB interface and whatever consumes the medium.
//! [`BulkTransport`] moves raw bytes over the bulk endpoint pair, a
//! [`BlockDevice`] driver turns that into block access, and the partition
//! module reads the partition table off an initialized device.

pub mod block;
pub mod partition;
pub mod transport;

pub use block::{BlockDevice, BlockDeviceFactory, NullBlockDevice, NullBlockFactory, StorageError};
pub use partition::{
    MbrReader, Partition, PartitionTable, PartitionTableEntry, PartitionTableFactory,
    PartitionTableReader,
};
pub use transport::{BulkTransport, ByteTransport, SharedConnection};
