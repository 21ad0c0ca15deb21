//! Mass-storage matching and setup constants
//!
//! Numeric values from the USB mass-storage class and bulk-only transport
//! specifications. Matching and setup code references these by name; the raw
//! numbers appear nowhere else.

use std::time::Duration;

/// USB interface class code for mass-storage devices
pub const MASS_STORAGE_CLASS: u8 = 8;

/// Interface subclass code for the SCSI transparent command set
pub const SUBCLASS_SCSI_TRANSPARENT: u8 = 6;

/// Interface protocol code for bulk-only transport
pub const PROTOCOL_BULK_ONLY: u8 = 80;

/// Endpoints a bulk-only interface is expected to expose (one IN, one OUT)
pub const EXPECTED_ENDPOINT_COUNT: usize = 2;

/// bmRequestType for Get Max LUN (device-to-host, class, interface recipient)
pub const MAX_LUN_REQUEST_TYPE: u8 = 161;

/// bRequest code for Get Max LUN
pub const MAX_LUN_REQUEST: u8 = 254;

/// Timeout for the Get Max LUN control transfer
pub const MAX_LUN_TIMEOUT: Duration = Duration::from_millis(5000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_match_wire_values() {
        assert_eq!(MASS_STORAGE_CLASS, 0x08);
        assert_eq!(SUBCLASS_SCSI_TRANSPARENT, 0x06);
        assert_eq!(PROTOCOL_BULK_ONLY, 0x50);
        assert_eq!(MAX_LUN_REQUEST_TYPE, 0xA1);
        assert_eq!(MAX_LUN_REQUEST, 0xFE);
        assert_eq!(MAX_LUN_TIMEOUT.as_millis(), 5000);
    }
}
