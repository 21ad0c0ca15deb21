//! Record format version management

use serde::{Deserialize, Serialize};

/// Record format version using semantic versioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Current record format version
pub const CURRENT_VERSION: RecordVersion = RecordVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

impl RecordVersion {
    /// Check if this version can read records written by another version
    pub fn is_compatible_with(&self, other: &RecordVersion) -> bool {
        self.major == other.major && self.minor >= other.minor
    }
}
