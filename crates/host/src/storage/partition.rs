//! Partition table discovery
//!
//! Reads the partition table from an initialized block device. Table formats
//! are pluggable through [`PartitionTableReader`]; the factory tries each
//! registered reader in order and the first one that recognizes the on-disk
//! layout wins. MBR is the only built-in format.

use crate::storage::block::{BlockDevice, StorageError};
use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

/// Size of the boot sector holding the MBR (bytes)
const BOOT_SECTOR_SIZE: usize = 512;

/// Offset of the partition table inside the boot sector
const TABLE_OFFSET: usize = 446;

/// Size of one partition table entry (bytes)
const ENTRY_SIZE: usize = 16;

/// Number of primary partition entries
const ENTRY_COUNT: usize = 4;

/// Boot indicator flag for a bootable partition
const BOOT_FLAG: u8 = 0x80;

/// One raw partition table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionTableEntry {
    /// Whether the boot indicator flag is set
    pub bootable: bool,
    /// Partition type code
    pub type_code: u8,
    /// First logical block of the partition
    pub lba_start: u32,
    /// Partition length in blocks
    pub sector_count: u32,
}

/// A parsed partition table
///
/// Holds only the non-empty entries, in table order.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    /// Non-empty entries in on-disk order
    pub entries: Vec<PartitionTableEntry>,
}

/// Reader for one partition table format
pub trait PartitionTableReader {
    /// Short name of the format, for logging
    fn name(&self) -> &'static str;

    /// Try to read a table of this format from the device
    ///
    /// Returns `Ok(None)` when the device does not carry this format, so the
    /// factory can move on to the next reader. Errors are reserved for
    /// transfer failures and tables that are recognized but malformed.
    fn read(&self, block: &mut dyn BlockDevice) -> Result<Option<PartitionTable>, StorageError>;
}

/// MBR (DOS) partition table reader
pub struct MbrReader;

impl PartitionTableReader for MbrReader {
    fn name(&self) -> &'static str {
        "mbr"
    }

    fn read(&self, block: &mut dyn BlockDevice) -> Result<Option<PartitionTable>, StorageError> {
        let block_size = block.block_size() as usize;
        if block_size == 0 {
            return Err(StorageError::InvalidTable {
                reason: "device reports zero block size".to_string(),
            });
        }

        // Read whole blocks covering the boot sector
        let blocks = BOOT_SECTOR_SIZE.div_ceil(block_size);
        let mut buf = vec![0u8; blocks * block_size];
        block.read_blocks(0, &mut buf)?;

        parse_mbr(&buf)
    }
}

/// Parse an MBR boot sector
///
/// `buf` must hold at least the first 512 bytes of the device.
fn parse_mbr(buf: &[u8]) -> Result<Option<PartitionTable>, StorageError> {
    if buf[510] != 0x55 || buf[511] != 0xAA {
        return Ok(None);
    }

    let mut entries = Vec::new();
    for i in 0..ENTRY_COUNT {
        let offset = TABLE_OFFSET + i * ENTRY_SIZE;
        let entry = &buf[offset..offset + ENTRY_SIZE];

        let type_code = entry[4];
        let sector_count = LittleEndian::read_u32(&entry[12..16]);
        if type_code == 0 || sector_count == 0 {
            continue;
        }

        // A valid boot indicator is 0x00 or 0x80; anything else means the
        // sector only looks like an MBR.
        if entry[0] != 0x00 && entry[0] != BOOT_FLAG {
            return Err(StorageError::InvalidTable {
                reason: format!("entry {} has invalid boot indicator {:#04x}", i, entry[0]),
            });
        }

        entries.push(PartitionTableEntry {
            bootable: entry[0] == BOOT_FLAG,
            type_code,
            lba_start: LittleEndian::read_u32(&entry[8..12]),
            sector_count,
        });
    }

    Ok(Some(PartitionTable { entries }))
}

/// Factory that tries each registered table format in order
pub struct PartitionTableFactory {
    readers: Vec<Box<dyn PartitionTableReader>>,
}

impl PartitionTableFactory {
    /// Create a factory with the built-in formats registered
    pub fn new() -> Self {
        Self {
            readers: vec![Box::new(MbrReader)],
        }
    }

    /// Register an additional table format
    ///
    /// Readers are tried in registration order.
    pub fn register(&mut self, reader: Box<dyn PartitionTableReader>) {
        self.readers.push(reader);
    }

    /// Read the partition table from a device
    ///
    /// Tries each registered reader; the first that recognizes the layout
    /// wins. Fails with [`StorageError::UnsupportedTable`] when none does.
    pub fn read_table(&self, block: &mut dyn BlockDevice) -> Result<PartitionTable, StorageError> {
        for reader in &self.readers {
            if let Some(table) = reader.read(block)? {
                debug!(
                    "Partition table read by {}: {} entries",
                    reader.name(),
                    table.entries.len()
                );
                return Ok(table);
            }
        }

        Err(StorageError::UnsupportedTable)
    }
}

impl Default for PartitionTableFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// One discovered partition with its geometry on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Index of the entry in the partition table
    pub index: usize,
    /// Whether the boot indicator flag is set
    pub bootable: bool,
    /// Partition type code
    pub type_code: u8,
    /// First logical block
    pub lba_start: u64,
    /// Length in blocks
    pub block_count: u64,
    /// Offset of the partition start in bytes
    pub byte_offset: u64,
    /// Partition size in bytes
    pub byte_size: u64,
}

impl Partition {
    /// Build a partition from a table entry and the device block size
    pub fn create(index: usize, entry: &PartitionTableEntry, block_size: u32) -> Self {
        let block_size = u64::from(block_size);
        let lba_start = u64::from(entry.lba_start);
        let block_count = u64::from(entry.sector_count);

        Self {
            index,
            bootable: entry.bootable,
            type_code: entry.type_code,
            lba_start,
            block_count,
            byte_offset: lba_start * block_size,
            byte_size: block_count * block_size,
        }
    }
}
