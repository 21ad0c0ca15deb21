//! Session record definition
//!
//! The record is the unit that crosses a process or component boundary: the
//! identifying descriptors of a matched mass-storage interface, tagged with
//! the record format version. It deliberately carries nothing else - no
//! connection state, no claimed-interface state, no logical-unit count. The
//! receiving side must re-initialize from scratch.

use serde::{Deserialize, Serialize};

use crate::types::{DeviceInfo, EndpointPair, InterfaceInfo};
use crate::version::RecordVersion;

/// Serializable identity of a matched mass-storage interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Record format version
    pub version: RecordVersion,
    /// The physical device
    pub device: DeviceInfo,
    /// The matched interface on that device
    pub interface: InterfaceInfo,
    /// The bulk endpoint pair selected by the matcher
    pub endpoints: EndpointPair,
}
