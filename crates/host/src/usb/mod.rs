//! USB subsystem
//!
//! Everything between the OS and the storage layer:
//! - Backend traits over the USB host ([`UsbHost`], [`UsbConnection`])
//! - The rusb implementation of those traits
//! - Mass-storage interface matching and endpoint selection
//! - Device discovery and the session lifecycle

pub mod backend;
pub mod enumerate;
pub mod matcher;
pub mod rusb_backend;
pub mod session;

// Re-export public types
pub use backend::{DiscoveredDevice, UsbConnection, UsbHost, UsbHostError};
pub use enumerate::{DeviceFilter, discover};
pub use matcher::match_interface;
pub use rusb_backend::RusbHost;
pub use session::{CloseReport, Session, SessionError, SessionState};
