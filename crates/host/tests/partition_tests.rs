//! Integration tests for partition table discovery
//!
//! Tests the table factory against in-memory block devices including:
//! - MBR discovery through the block device layer
//! - Unrecognized media
//! - Devices with non-512-byte blocks
//! - Custom reader registration

use host::storage::{PartitionTable, PartitionTableEntry, PartitionTableReader};
use host::testing::{create_mbr_sector, create_mock_transport, MemoryBlockFactory};
use host::{BlockDevice, BlockDeviceFactory, PartitionTableFactory, StorageError};

fn device_over(image: Vec<u8>, block_size: u32) -> Box<dyn BlockDevice> {
    let factory = MemoryBlockFactory::new(image, block_size);
    let mut block = factory
        .create(Box::new(create_mock_transport()))
        .expect("factory cannot fail");
    block.init().expect("init cannot fail");
    block
}

mod mbr {
    use super::*;

    #[test]
    fn test_reads_mbr_from_device() {
        let sector = create_mbr_sector(&[(true, 0x0C, 2048, 204800), (false, 0x83, 206848, 409600)]);
        let mut block = device_over(sector, 512);
        let factory = PartitionTableFactory::new();

        let table = factory.read_table(block.as_mut()).unwrap();

        assert_eq!(table.entries.len(), 2);
        assert!(table.entries[0].bootable);
        assert_eq!(table.entries[0].type_code, 0x0C);
        assert_eq!(table.entries[1].lba_start, 206848);
    }

    #[test]
    fn test_unrecognized_media_unsupported() {
        let mut block = device_over(vec![0u8; 512], 512);
        let factory = PartitionTableFactory::new();

        assert!(matches!(
            factory.read_table(block.as_mut()),
            Err(StorageError::UnsupportedTable)
        ));
    }

    #[test]
    fn test_reads_mbr_from_4k_block_device() {
        let mut image = create_mbr_sector(&[(false, 0x07, 256, 1024)]);
        image.resize(4096, 0);
        let mut block = device_over(image, 4096);
        let factory = PartitionTableFactory::new();

        let table = factory.read_table(block.as_mut()).unwrap();

        assert_eq!(table.entries.len(), 1);
        assert_eq!(table.entries[0].lba_start, 256);
    }
}

mod readers {
    use super::*;

    /// Reader that recognizes an all-zero first block as an empty table
    struct ZeroTableReader;

    impl PartitionTableReader for ZeroTableReader {
        fn name(&self) -> &'static str {
            "zero"
        }

        fn read(
            &self,
            block: &mut dyn BlockDevice,
        ) -> Result<Option<PartitionTable>, StorageError> {
            let mut buf = vec![0u8; block.block_size() as usize];
            block.read_blocks(0, &mut buf)?;
            if buf.iter().all(|&b| b == 0) {
                Ok(Some(PartitionTable::default()))
            } else {
                Ok(None)
            }
        }
    }

    /// Reader that claims any media with a single sentinel entry
    struct AlwaysClaimReader;

    impl PartitionTableReader for AlwaysClaimReader {
        fn name(&self) -> &'static str {
            "always"
        }

        fn read(
            &self,
            _block: &mut dyn BlockDevice,
        ) -> Result<Option<PartitionTable>, StorageError> {
            Ok(Some(PartitionTable {
                entries: vec![PartitionTableEntry {
                    bootable: false,
                    type_code: 0xEE,
                    lba_start: 1,
                    sector_count: 1,
                }],
            }))
        }
    }

    #[test]
    fn test_registered_reader_handles_unknown_format() {
        let mut block = device_over(vec![0u8; 512], 512);
        let mut factory = PartitionTableFactory::new();
        factory.register(Box::new(ZeroTableReader));

        let table = factory.read_table(block.as_mut()).unwrap();
        assert!(table.entries.is_empty());
    }

    #[test]
    fn test_builtin_reader_tried_first() {
        let sector = create_mbr_sector(&[(false, 0x83, 2048, 4096)]);
        let mut block = device_over(sector, 512);
        let mut factory = PartitionTableFactory::new();
        factory.register(Box::new(AlwaysClaimReader));

        // The MBR reader recognizes the sector before the fallback runs
        let table = factory.read_table(block.as_mut()).unwrap();
        assert_eq!(table.entries[0].type_code, 0x83);
    }

    #[test]
    fn test_fallback_reader_wins_when_builtin_declines() {
        let mut block = device_over(vec![0xFFu8; 512], 512);
        let mut factory = PartitionTableFactory::new();
        factory.register(Box::new(AlwaysClaimReader));

        let table = factory.read_table(block.as_mut()).unwrap();
        assert_eq!(table.entries[0].type_code, 0xEE);
    }
}
