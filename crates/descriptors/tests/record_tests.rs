//! Record Integration Tests
//!
//! End-to-end tests for the record codec covering:
//! - Field-level fidelity across framed roundtrips
//! - Version gating of foreign records
//! - Sequential framed records on one stream
//! - Interfaces with more endpoints than the bulk pair
//!
//! Run with: `cargo test -p descriptors --test record_tests`

use descriptors::{
    CURRENT_VERSION, DeviceInfo, DeviceSpeed, EndpointInfo, EndpointPair, InterfaceInfo,
    RecordError, SessionRecord, TransferKind, consts, decode_framed, encode_framed, read_framed,
    validate_version, write_framed,
};
use std::io::Cursor;

fn scsi_disk_record() -> SessionRecord {
    let bulk_in = EndpointInfo {
        address: 0x81,
        transfer: TransferKind::Bulk,
        max_packet_size: 512,
    };
    let bulk_out = EndpointInfo {
        address: 0x02,
        transfer: TransferKind::Bulk,
        max_packet_size: 512,
    };
    SessionRecord {
        version: CURRENT_VERSION,
        device: DeviceInfo {
            vendor_id: 0x0951,
            product_id: 0x1666,
            bus_number: 2,
            device_address: 7,
            manufacturer: Some("Kingston".to_string()),
            product: Some("DataTraveler 3.0".to_string()),
            serial_number: Some("60A44C4139ACBE21".to_string()),
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: DeviceSpeed::Super,
            num_configurations: 1,
        },
        interface: InterfaceInfo {
            number: 0,
            alternate_setting: 0,
            class: consts::MASS_STORAGE_CLASS,
            subclass: consts::SUBCLASS_SCSI_TRANSPARENT,
            protocol: consts::PROTOCOL_BULK_ONLY,
            endpoints: vec![bulk_in, bulk_out],
        },
        endpoints: EndpointPair { bulk_in, bulk_out },
    }
}

#[test]
fn test_framed_roundtrip_preserves_every_field() {
    let record = scsi_disk_record();

    let framed = encode_framed(&record).unwrap();
    let decoded = decode_framed(&framed).unwrap();

    assert_eq!(decoded.version, record.version);

    assert_eq!(decoded.device.vendor_id, record.device.vendor_id);
    assert_eq!(decoded.device.product_id, record.device.product_id);
    assert_eq!(decoded.device.bus_number, record.device.bus_number);
    assert_eq!(decoded.device.device_address, record.device.device_address);
    assert_eq!(decoded.device.manufacturer, record.device.manufacturer);
    assert_eq!(decoded.device.product, record.device.product);
    assert_eq!(decoded.device.serial_number, record.device.serial_number);
    assert_eq!(decoded.device.speed, record.device.speed);

    assert_eq!(decoded.interface.number, record.interface.number);
    assert_eq!(decoded.interface.class, consts::MASS_STORAGE_CLASS);
    assert_eq!(decoded.interface.subclass, consts::SUBCLASS_SCSI_TRANSPARENT);
    assert_eq!(decoded.interface.protocol, consts::PROTOCOL_BULK_ONLY);
    assert_eq!(decoded.interface.endpoints, record.interface.endpoints);

    assert_eq!(decoded.endpoints, record.endpoints);
}

#[test]
fn test_record_with_extra_interrupt_endpoint() {
    // Some real sticks expose a third (interrupt) endpoint; the record keeps
    // the full endpoint list while the pair names the two that matter.
    let mut record = scsi_disk_record();
    record.interface.endpoints.push(EndpointInfo {
        address: 0x83,
        transfer: TransferKind::Interrupt,
        max_packet_size: 8,
    });

    let framed = encode_framed(&record).unwrap();
    let decoded = decode_framed(&framed).unwrap();

    assert_eq!(decoded.interface.endpoints.len(), 3);
    assert_eq!(decoded.endpoints.bulk_in.address, 0x81);
    assert_eq!(decoded.endpoints.bulk_out.address, 0x02);
}

#[test]
fn test_foreign_major_version_is_rejected() {
    let mut record = scsi_disk_record();
    record.version.major = CURRENT_VERSION.major + 1;

    // The codec itself stays format-agnostic; the gate is validate_version.
    let framed = encode_framed(&record).unwrap();
    let decoded = decode_framed(&framed).unwrap();

    let result = validate_version(&decoded.version);
    assert!(matches!(
        result,
        Err(RecordError::IncompatibleVersion { .. })
    ));
}

#[test]
fn test_sequential_records_on_one_stream() {
    let first = scsi_disk_record();
    let mut second = scsi_disk_record();
    second.device.device_address = 9;
    second.device.serial_number = None;

    let mut buffer = Vec::new();
    write_framed(&mut buffer, &first).unwrap();
    write_framed(&mut buffer, &second).unwrap();

    let mut cursor = Cursor::new(buffer);
    let a = read_framed(&mut cursor).unwrap();
    let b = read_framed(&mut cursor).unwrap();

    assert_eq!(a.device.device_address, 7);
    assert_eq!(b.device.device_address, 9);
    assert!(b.device.serial_number.is_none());

    // Stream exhausted: the next read fails with an I/O error
    let result = read_framed(&mut cursor);
    assert!(matches!(result, Err(RecordError::Io(_))));
}
