//! Identity records for rust-usb-msd
//!
//! This crate defines the serializable identity of a matched USB mass-storage
//! interface: the device, interface, and endpoint descriptors that a session
//! is bound to. It provides type-safe record definitions,
//! serialization/deserialization using postcard, and record versioning.
//!
//! Live OS resources (open connections, claimed interfaces) are never part of
//! a record. A session rebuilt from a record always starts uninitialized and
//! must be initialized again on the receiving side.
//!
//! # Example
//!
//! ```
//! use descriptors::{
//!     CURRENT_VERSION, DeviceInfo, DeviceSpeed, EndpointInfo, EndpointPair, InterfaceInfo,
//!     SessionRecord, TransferKind, consts, decode_record, encode_record,
//! };
//!
//! let bulk_in = EndpointInfo {
//!     address: 0x81,
//!     transfer: TransferKind::Bulk,
//!     max_packet_size: 512,
//! };
//! let bulk_out = EndpointInfo {
//!     address: 0x02,
//!     transfer: TransferKind::Bulk,
//!     max_packet_size: 512,
//! };
//!
//! let record = SessionRecord {
//!     version: CURRENT_VERSION,
//!     device: DeviceInfo {
//!         vendor_id: 0x0781,
//!         product_id: 0x5567,
//!         bus_number: 1,
//!         device_address: 4,
//!         manufacturer: Some("SanDisk".to_string()),
//!         product: Some("Cruzer Blade".to_string()),
//!         serial_number: None,
//!         class: 0,
//!         subclass: 0,
//!         protocol: 0,
//!         speed: DeviceSpeed::High,
//!         num_configurations: 1,
//!     },
//!     interface: InterfaceInfo {
//!         number: 0,
//!         alternate_setting: 0,
//!         class: consts::MASS_STORAGE_CLASS,
//!         subclass: consts::SUBCLASS_SCSI_TRANSPARENT,
//!         protocol: consts::PROTOCOL_BULK_ONLY,
//!         endpoints: vec![bulk_in, bulk_out],
//!     },
//!     endpoints: EndpointPair { bulk_in, bulk_out },
//! };
//!
//! // Serialize
//! let bytes = encode_record(&record).unwrap();
//!
//! // Deserialize
//! let decoded = decode_record(&bytes).unwrap();
//! assert_eq!(decoded.version, CURRENT_VERSION);
//! assert_eq!(decoded.device.vendor_id, 0x0781);
//! ```
//!
//! # Framed Records
//!
//! For file or stream transport, records can be length-prefixed and
//! CRC-protected with [`encode_framed`]/[`decode_framed`].

pub mod codec;
pub mod consts;
pub mod error;
pub mod record;
pub mod types;
pub mod version;

pub use codec::{
    MAX_RECORD_SIZE, compute_checksum, decode_framed, decode_record, encode_framed, encode_record,
    read_framed, validate_version, verify_checksum, write_framed,
};
pub use error::{RecordError, Result};
pub use record::SessionRecord;
pub use types::{
    DeviceInfo, DeviceSpeed, EndpointDirection, EndpointInfo, EndpointPair, InterfaceInfo,
    TransferKind,
};
pub use version::{CURRENT_VERSION, RecordVersion};
