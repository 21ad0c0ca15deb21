//! Record serialization and deserialization using postcard
//!
//! This module provides encoding/decoding functions for session records.
//! Records are serialized using postcard (compact binary format) and can be
//! framed for transport over a byte stream or stored in a file.
//!
//! # Frame Format
//!
//! Framed records are length-prefixed and checksummed:
//! ```text
//! [Length: u32 (big-endian)][Record bytes (postcard)][CRC32: u32 (big-endian)]
//! ```
//!
//! The length covers the record bytes only. The CRC32 covers the record bytes
//! and is verified before decoding. Maximum record size is 64 KiB; records
//! hold descriptors and short strings, so anything larger is corrupt.

use crate::{
    CURRENT_VERSION, RecordVersion, SessionRecord,
    error::{RecordError, Result},
};
use std::io::{Read, Write};

/// Maximum allowed serialized record size (64 KiB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Encode a record to bytes using postcard
///
/// # Example
/// ```
/// use descriptors::{CURRENT_VERSION, encode_record};
/// # use descriptors::{DeviceInfo, DeviceSpeed, EndpointInfo, EndpointPair, InterfaceInfo,
/// #     SessionRecord, TransferKind};
/// # let bulk_in = EndpointInfo { address: 0x81, transfer: TransferKind::Bulk, max_packet_size: 512 };
/// # let bulk_out = EndpointInfo { address: 0x02, transfer: TransferKind::Bulk, max_packet_size: 512 };
/// # let record = SessionRecord {
/// #     version: CURRENT_VERSION,
/// #     device: DeviceInfo { vendor_id: 0x1234, product_id: 0x5678, bus_number: 1,
/// #         device_address: 4, manufacturer: None, product: None, serial_number: None,
/// #         class: 0, subclass: 0, protocol: 0, speed: DeviceSpeed::High, num_configurations: 1 },
/// #     interface: InterfaceInfo { number: 0, alternate_setting: 0, class: 8, subclass: 6,
/// #         protocol: 80, endpoints: vec![bulk_in, bulk_out] },
/// #     endpoints: EndpointPair { bulk_in, bulk_out },
/// # };
/// let bytes = encode_record(&record).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode_record(record: &SessionRecord) -> Result<Vec<u8>> {
    postcard::to_allocvec(record).map_err(RecordError::from)
}

/// Decode a record from bytes using postcard
///
/// Does not check version compatibility; callers that rebuild sessions from
/// records run [`validate_version`] on the result.
pub fn decode_record(bytes: &[u8]) -> Result<SessionRecord> {
    postcard::from_bytes(bytes).map_err(RecordError::from)
}

/// Validate record format version compatibility
///
/// Returns an error if the record version is incompatible with the current
/// version. Compatible if major versions match; minor version differences are
/// allowed in both directions.
pub fn validate_version(record_version: &RecordVersion) -> Result<()> {
    // Major versions must match
    if record_version.major != CURRENT_VERSION.major {
        return Err(RecordError::IncompatibleVersion {
            major: record_version.major,
            minor: record_version.minor,
            expected_major: CURRENT_VERSION.major,
            expected_minor: CURRENT_VERSION.minor,
        });
    }
    // Minor version differences are allowed (both forward and backward compatible)
    Ok(())
}

/// Compute CRC32 checksum for data
#[inline]
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verify CRC32 checksum for data
#[inline]
pub fn verify_checksum(data: &[u8], expected_checksum: u32) -> bool {
    compute_checksum(data) == expected_checksum
}

/// Encode a record with length prefix and trailing checksum for framing
///
/// Frame format: [4-byte length (big-endian)][postcard record bytes]
/// [4-byte CRC32 (big-endian)]
pub fn encode_framed(record: &SessionRecord) -> Result<Vec<u8>> {
    let record_bytes = encode_record(record)?;
    let record_len = record_bytes.len();

    // Check maximum record size
    if record_len > MAX_RECORD_SIZE {
        return Err(RecordError::FrameTooLarge {
            size: record_len,
            max: MAX_RECORD_SIZE,
        });
    }

    let checksum = compute_checksum(&record_bytes);

    // Build frame: [length: u32][record bytes][crc32: u32]
    let mut frame = Vec::with_capacity(4 + record_len + 4);
    frame.extend_from_slice(&(record_len as u32).to_be_bytes());
    frame.extend_from_slice(&record_bytes);
    frame.extend_from_slice(&checksum.to_be_bytes());

    Ok(frame)
}

/// Decode a framed record, verifying its checksum
///
/// Expects frame format: [4-byte length (big-endian)][postcard record bytes]
/// [4-byte CRC32 (big-endian)]
pub fn decode_framed(frame: &[u8]) -> Result<SessionRecord> {
    // Need at least 4 bytes for the length prefix
    if frame.len() < 4 {
        return Err(RecordError::IncompleteFrame {
            expected: 4,
            actual: frame.len(),
        });
    }

    // Read length prefix
    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;

    // Check maximum record size
    if length > MAX_RECORD_SIZE {
        return Err(RecordError::FrameTooLarge {
            size: length,
            max: MAX_RECORD_SIZE,
        });
    }

    // Check we have record bytes plus the trailing checksum
    if frame.len() < 4 + length + 4 {
        return Err(RecordError::IncompleteFrame {
            expected: 4 + length + 4,
            actual: frame.len(),
        });
    }

    // Verify checksum before decoding
    let record_bytes = &frame[4..4 + length];
    let crc_offset = 4 + length;
    let expected = u32::from_be_bytes([
        frame[crc_offset],
        frame[crc_offset + 1],
        frame[crc_offset + 2],
        frame[crc_offset + 3],
    ]);
    let computed = compute_checksum(record_bytes);
    if computed != expected {
        return Err(RecordError::ChecksumMismatch { expected, computed });
    }

    decode_record(record_bytes)
}

/// Write a framed record to a writer (e.g., a file or pipe)
pub fn write_framed<W: Write>(writer: &mut W, record: &SessionRecord) -> Result<()> {
    let framed = encode_framed(record)?;
    writer.write_all(&framed)?;
    Ok(())
}

/// Read a framed record from a reader (e.g., a file or pipe)
///
/// Verifies the trailing checksum before decoding.
pub fn read_framed<R: Read>(reader: &mut R) -> Result<SessionRecord> {
    // Read length prefix
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let length = u32::from_be_bytes(len_bytes) as usize;

    // Check maximum record size
    if length > MAX_RECORD_SIZE {
        return Err(RecordError::FrameTooLarge {
            size: length,
            max: MAX_RECORD_SIZE,
        });
    }

    // Read record bytes and trailing checksum
    let mut record_bytes = vec![0u8; length];
    reader.read_exact(&mut record_bytes)?;
    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;

    let expected = u32::from_be_bytes(crc_bytes);
    let computed = compute_checksum(&record_bytes);
    if computed != expected {
        return Err(RecordError::ChecksumMismatch { expected, computed });
    }

    decode_record(&record_bytes)
}

#[cfg(test)]
fn sample_record() -> SessionRecord {
    use crate::types::{
        DeviceInfo, DeviceSpeed, EndpointInfo, EndpointPair, InterfaceInfo, TransferKind,
    };

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
            vendor_id: 0x0781,
            product_id: 0x5567,
            bus_number: 1,
            device_address: 5,
            manufacturer: Some("Test Manufacturer".to_string()),
            product: Some("Test Product".to_string()),
            serial_number: Some("ABC123".to_string()),
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: DeviceSpeed::High,
            num_configurations: 1,
        },
        interface: InterfaceInfo {
            number: 0,
            alternate_setting: 0,
            class: 0x08,
            subclass: 0x06,
            protocol: 0x50,
            endpoints: vec![bulk_in, bulk_out],
        },
        endpoints: EndpointPair { bulk_in, bulk_out },
    }
}
