//! Mass-storage session lifecycle
//!
//! A [`Session`] binds one matched interface of one device and walks it
//! through its lifecycle: uninitialized after discovery, ready once the
//! device is opened, claimed and set up, closed after release. The open
//! connection, the transport and the block device driver exist exactly while
//! the session is ready; the other two states hold identity only.

use crate::storage::block::{BlockDevice, BlockDeviceFactory, StorageError};
use crate::storage::partition::{Partition, PartitionTableFactory};
use crate::storage::transport::{BulkTransport, SharedConnection, lock_connection};
use crate::usb::backend::{UsbHost, UsbHostError};
use descriptors::{
    CURRENT_VERSION, DeviceInfo, EndpointPair, InterfaceInfo, RecordError, SessionRecord, consts,
    validate_version,
};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Discovered but not set up; no OS resources held
    Uninitialized,
    /// Interface claimed and device set up; transfers possible
    Ready,
    /// Resources released; can be initialized again
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session-level errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// The host denied access to the device before any transfer was made
    #[error("Permission denied for device {device}")]
    PermissionDenied { device: String },

    /// Opening the device failed
    #[error("Failed to open device: {source}")]
    Open { source: UsbHostError },

    /// Claiming the interface failed
    #[error("Failed to claim interface {interface}: {source}")]
    Claim { interface: u8, source: UsbHostError },

    /// The Get Max LUN request failed
    #[error("Get Max LUN request failed: {source}")]
    MaxLun { source: UsbHostError },

    /// Block device or partition table failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The operation is not allowed in the current state
    #[error("Cannot {operation} a session in {state} state")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

/// What close managed to tear down
///
/// A release failure is reported here rather than as an error; the
/// connection is closed regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReport {
    /// Whether the interface was released back to the OS
    pub interface_released: bool,
    /// Whether the connection was closed
    pub connection_closed: bool,
}

/// Resources held while the session is ready
///
/// Bundling them into the ready state makes "all present or all absent"
/// structural; there is no way to hold a transport without its connection.
struct ActiveResources {
    connection: SharedConnection,
    transport: BulkTransport,
    block: Box<dyn BlockDevice>,
}

enum Lifecycle {
    Uninitialized,
    Ready(ActiveResources),
    Closed,
}

/// One claimed mass-storage function on one device
///
/// Created by discovery with the matched interface and endpoint pair;
/// [`Session::init`] runs the setup sequence and [`Session::close`] releases
/// everything. A session can be closed and initialized again, e.g. after
/// the user re-plugs the device.
pub struct Session {
    device: DeviceInfo,
    interface: InterfaceInfo,
    endpoints: EndpointPair,
    force_claim: bool,
    lifecycle: Lifecycle,
    max_lun: Option<u8>,
    partitions: Vec<Partition>,
}

impl Session {
    /// Create an uninitialized session for a matched interface
    pub fn new(device: DeviceInfo, interface: InterfaceInfo, endpoints: EndpointPair) -> Self {
        Self {
            device,
            interface,
            endpoints,
            force_claim: true,
            lifecycle: Lifecycle::Uninitialized,
            max_lun: None,
            partitions: Vec::new(),
        }
    }

    /// Initialize the session: open, claim, and set up the device
    ///
    /// Runs the setup sequence in order: open the device, claim the matched
    /// interface, build the bulk transport, query Max LUN, create and
    /// initialize the block device driver. If any step fails, everything
    /// acquired by the earlier steps is torn down and the session stays in
    /// its previous state.
    pub fn init(
        &mut self,
        host: &dyn UsbHost,
        block_factory: &dyn BlockDeviceFactory,
    ) -> Result<(), SessionError> {
        if matches!(self.lifecycle, Lifecycle::Ready(_)) {
            return Err(SessionError::InvalidState {
                operation: "initialize",
                state: SessionState::Ready,
            });
        }

        // Check permission before touching the device at all
        if !host.has_permission(&self.device) {
            return Err(SessionError::PermissionDenied {
                device: self.device.to_string(),
            });
        }

        let (resources, max_lun) = self.setup_device(host, block_factory)?;
        self.lifecycle = Lifecycle::Ready(resources);
        self.max_lun = Some(max_lun);

        info!("Initialized session for {}", self.device);
        Ok(())
    }

    /// Run the device setup sequence
    ///
    /// Acquires resources step by step and unwinds the acquired ones on any
    /// failure, leaving the caller's state untouched.
    fn setup_device(
        &self,
        host: &dyn UsbHost,
        block_factory: &dyn BlockDeviceFactory,
    ) -> Result<(ActiveResources, u8), SessionError> {
        debug!("Setting up device {}", self.device);

        let connection = host
            .open(&self.device)
            .map_err(|source| SessionError::Open { source })?;
        let connection: SharedConnection = Arc::new(Mutex::new(connection));

        let claim_result = lock_connection(&connection)
            .and_then(|mut conn| conn.claim_interface(self.interface.number, self.force_claim));
        if let Err(source) = claim_result {
            unwind_setup(&connection, None);
            return Err(SessionError::Claim {
                interface: self.interface.number,
                source,
            });
        }

        let transport = BulkTransport::new(connection.clone(), self.endpoints);

        let max_lun = match self.read_max_lun(&connection) {
            Ok(value) => value,
            Err(source) => {
                unwind_setup(&connection, Some(self.interface.number));
                return Err(SessionError::MaxLun { source });
            }
        };
        info!("MAX LUN {}", max_lun);

        let block = block_factory
            .create(Box::new(transport.clone()))
            .and_then(|mut block| {
                block.init()?;
                Ok(block)
            });
        let block = match block {
            Ok(block) => block,
            Err(source) => {
                unwind_setup(&connection, Some(self.interface.number));
                return Err(SessionError::Storage(source));
            }
        };

        Ok((
            ActiveResources {
                connection,
                transport,
                block,
            },
            max_lun,
        ))
    }

    /// Query the highest LUN number via the class-specific control request
    fn read_max_lun(&self, connection: &SharedConnection) -> Result<u8, UsbHostError> {
        let mut buf = [0u8; 1];
        lock_connection(connection)?.control_in(
            consts::MAX_LUN_REQUEST_TYPE,
            consts::MAX_LUN_REQUEST,
            0,
            u16::from(self.interface.number),
            &mut buf,
            consts::MAX_LUN_TIMEOUT,
        )?;
        Ok(buf[0])
    }

    /// Close the session and release its resources
    ///
    /// Releases the claimed interface, then closes the connection. A release
    /// failure is logged and reported but never blocks the close; the
    /// connection is closed either way. Closing an already closed session is
    /// a no-op.
    pub fn close(&mut self) -> Result<CloseReport, SessionError> {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Closed) {
            Lifecycle::Ready(active) => {
                debug!("Closing device {}", self.device);
                let mut report = CloseReport {
                    interface_released: false,
                    connection_closed: false,
                };

                match lock_connection(&active.connection) {
                    Ok(mut conn) => {
                        match conn.release_interface(self.interface.number) {
                            Ok(()) => report.interface_released = true,
                            Err(e) => warn!(
                                "Failed to release interface {}: {}",
                                self.interface.number, e
                            ),
                        }
                        conn.close();
                        report.connection_closed = true;
                    }
                    Err(e) => warn!("Could not lock connection for close: {}", e),
                }

                self.max_lun = None;
                self.partitions.clear();
                Ok(report)
            }
            Lifecycle::Closed => Ok(CloseReport {
                interface_released: false,
                connection_closed: false,
            }),
            Lifecycle::Uninitialized => {
                self.lifecycle = Lifecycle::Uninitialized;
                Err(SessionError::InvalidState {
                    operation: "close",
                    state: SessionState::Uninitialized,
                })
            }
        }
    }

    /// Read the partition table from the initialized device
    ///
    /// Reads the table fresh from the medium on every call, replacing any
    /// previously discovered partitions.
    pub fn read_partitions(
        &mut self,
        table_factory: &PartitionTableFactory,
    ) -> Result<&[Partition], SessionError> {
        let Lifecycle::Ready(active) = &mut self.lifecycle else {
            return Err(SessionError::InvalidState {
                operation: "read partitions from",
                state: self.state(),
            });
        };

        let table = table_factory.read_table(active.block.as_mut())?;
        let block_size = active.block.block_size();

        self.partitions = table
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Partition::create(index, entry, block_size))
            .collect();

        debug!(
            "Discovered {} partitions on {}",
            self.partitions.len(),
            self.device
        );
        Ok(&self.partitions)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        match self.lifecycle {
            Lifecycle::Uninitialized => SessionState::Uninitialized,
            Lifecycle::Ready(_) => SessionState::Ready,
            Lifecycle::Closed => SessionState::Closed,
        }
    }

    /// The device this session is bound to
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// The matched mass-storage interface
    pub fn interface(&self) -> &InterfaceInfo {
        &self.interface
    }

    /// The bulk endpoint pair selected by the matcher
    pub fn endpoints(&self) -> EndpointPair {
        self.endpoints
    }

    /// Whether init detaches a kernel driver before claiming
    pub fn force_claim(&self) -> bool {
        self.force_claim
    }

    /// Control kernel driver detach on claim (on by default)
    pub fn set_force_claim(&mut self, force: bool) {
        self.force_claim = force;
    }

    /// The bulk transport of a ready session
    pub fn transport(&self) -> Result<&BulkTransport, SessionError> {
        match &self.lifecycle {
            Lifecycle::Ready(active) => Ok(&active.transport),
            _ => Err(SessionError::InvalidState {
                operation: "get the transport of",
                state: self.state(),
            }),
        }
    }

    /// The block device driver of a ready session
    pub fn block_device(&mut self) -> Result<&mut dyn BlockDevice, SessionError> {
        let state = self.state();
        match &mut self.lifecycle {
            Lifecycle::Ready(active) => Ok(active.block.as_mut()),
            _ => Err(SessionError::InvalidState {
                operation: "get the block device of",
                state,
            }),
        }
    }

    /// Highest LUN number reported by the device
    pub fn max_lun(&self) -> Result<u8, SessionError> {
        self.max_lun.ok_or(SessionError::InvalidState {
            operation: "read the max LUN of",
            state: self.state(),
        })
    }

    /// Number of logical units (Max LUN plus one)
    pub fn lun_count(&self) -> Result<u16, SessionError> {
        self.max_lun().map(|max_lun| u16::from(max_lun) + 1)
    }

    /// Partitions found by the last [`Session::read_partitions`] call
    pub fn partitions(&self) -> Result<&[Partition], SessionError> {
        match self.lifecycle {
            Lifecycle::Ready(_) => Ok(&self.partitions),
            _ => Err(SessionError::InvalidState {
                operation: "list the partitions of",
                state: self.state(),
            }),
        }
    }

    /// Snapshot the session identity into a serializable record
    ///
    /// Records never carry live resources; only the identity descriptors are
    /// captured, regardless of the session's current state.
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            version: CURRENT_VERSION,
            device: self.device.clone(),
            interface: self.interface.clone(),
            endpoints: self.endpoints,
        }
    }

    /// Rebuild a session from a record
    ///
    /// The result is always uninitialized: whatever state the recording side
    /// was in, the receiving side holds none of its OS resources and must
    /// run [`Session::init`] itself.
    pub fn from_record(record: SessionRecord) -> Result<Self, RecordError> {
        validate_version(&record.version)?;
        Ok(Self::new(record.device, record.interface, record.endpoints))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("interface", &self.interface.number)
            .field("state", &self.state())
            .field("max_lun", &self.max_lun)
            .finish()
    }
}

/// Roll back a partial setup
///
/// Releases the interface if one was claimed, then closes the connection.
/// Failures are logged; rollback never blocks the error that triggered it.
fn unwind_setup(connection: &SharedConnection, claimed_interface: Option<u8>) {
    match lock_connection(connection) {
        Ok(mut conn) => {
            if let Some(interface) = claimed_interface {
                if let Err(e) = conn.release_interface(interface) {
                    warn!(
                        "Failed to release interface {} during rollback: {}",
                        interface, e
                    );
                }
            }
            conn.close();
        }
        Err(e) => warn!("Could not lock connection during rollback: {}", e),
    }
}
