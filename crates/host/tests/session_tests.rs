//! Integration tests for the session lifecycle
//!
//! Tests the session state machine against a mock USB host including:
//! - Setup sequence ordering and Max LUN handling
//! - Permission checks before any device I/O
//! - Rollback of partially completed setup
//! - Close semantics and the close report
//! - State-gated accessors
//! - Record round-trips across the serialization boundary

use descriptors::RecordVersion;
use host::testing::{
    create_bulk_only_interface, create_mbr_sector, create_mock_device_info, MemoryBlockFactory,
    MockCall, MockHost,
};
use host::{
    match_interface, NullBlockFactory, PartitionTableFactory, Session, SessionError, SessionState,
};

fn make_session() -> Session {
    make_session_with_interface(0)
}

fn make_session_with_interface(number: u8) -> Session {
    let device = create_mock_device_info(0x0781, 0x5567, 4);
    let interface = create_bulk_only_interface(number);
    let endpoints = match_interface(&interface).expect("interface should match");
    Session::new(device, interface, endpoints)
}

fn mock_host_for(session: &Session) -> MockHost {
    MockHost::new().with_device(session.device().clone(), vec![session.interface().clone()])
}

mod setup {
    use super::*;

    #[test]
    fn test_init_reaches_ready() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        assert_eq!(session.state(), SessionState::Uninitialized);
        session.init(&host, &NullBlockFactory).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_init_call_sequence() {
        let mut session = make_session_with_interface(1);
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();

        assert_eq!(
            host.calls(),
            vec![
                MockCall::Open,
                MockCall::ClaimInterface {
                    interface: 1,
                    force: true,
                },
                MockCall::ControlIn {
                    request_type: 0xA1,
                    request: 0xFE,
                    value: 0,
                    index: 1,
                    length: 1,
                },
            ]
        );
    }

    #[test]
    fn test_init_queries_max_lun() {
        let mut session = make_session();
        let host = mock_host_for(&session).with_max_lun(3);

        session.init(&host, &NullBlockFactory).unwrap();

        assert_eq!(session.max_lun().unwrap(), 3);
        assert_eq!(session.lun_count().unwrap(), 4);
    }

    #[test]
    fn test_zero_max_lun_means_one_lun() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();

        assert_eq!(session.max_lun().unwrap(), 0);
        assert_eq!(session.lun_count().unwrap(), 1);
    }

    #[test]
    fn test_init_without_kernel_detach() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.set_force_claim(false);
        session.init(&host, &NullBlockFactory).unwrap();

        assert!(host.calls().contains(&MockCall::ClaimInterface {
            interface: 0,
            force: false,
        }));
    }

    #[test]
    fn test_init_while_ready_fails_without_io() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();
        let calls_before = host.calls().len();

        let err = session.init(&host, &NullBlockFactory).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Ready,
                ..
            }
        ));
        assert_eq!(host.calls().len(), calls_before);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_reinit_after_close() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        session.init(&host, &NullBlockFactory).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }
}

mod permission {
    use super::*;

    #[test]
    fn test_denied_permission_fails_before_io() {
        let mut session = make_session();
        let host = mock_host_for(&session).deny_permission();

        let err = session.init(&host, &NullBlockFactory).unwrap_err();

        assert!(matches!(err, SessionError::PermissionDenied { .. }));
        assert!(host.calls().is_empty());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }
}

mod rollback {
    use super::*;

    #[test]
    fn test_failed_open_leaves_uninitialized() {
        let mut session = make_session();
        let host = mock_host_for(&session).fail_open();

        let err = session.init(&host, &NullBlockFactory).unwrap_err();

        assert!(matches!(err, SessionError::Open { .. }));
        assert_eq!(host.calls(), vec![MockCall::Open]);
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_failed_claim_closes_connection() {
        let mut session = make_session();
        let host = mock_host_for(&session).fail_claim();

        let err = session.init(&host, &NullBlockFactory).unwrap_err();

        assert!(matches!(err, SessionError::Claim { interface: 0, .. }));
        assert_eq!(
            host.calls(),
            vec![
                MockCall::Open,
                MockCall::ClaimInterface {
                    interface: 0,
                    force: true,
                },
                MockCall::CloseConnection,
            ]
        );
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_failed_max_lun_releases_and_closes() {
        let mut session = make_session();
        let host = mock_host_for(&session).fail_control_in();

        let err = session.init(&host, &NullBlockFactory).unwrap_err();

        assert!(matches!(err, SessionError::MaxLun { .. }));
        assert_eq!(
            host.calls(),
            vec![
                MockCall::Open,
                MockCall::ClaimInterface {
                    interface: 0,
                    force: true,
                },
                MockCall::ControlIn {
                    request_type: 0xA1,
                    request: 0xFE,
                    value: 0,
                    index: 0,
                    length: 1,
                },
                MockCall::ReleaseInterface { interface: 0 },
                MockCall::CloseConnection,
            ]
        );
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_failed_block_init_releases_and_closes() {
        let mut session = make_session();
        let host = mock_host_for(&session);
        let factory = MemoryBlockFactory::new(vec![0u8; 1024], 512).fail_init();

        let err = session.init(&host, &factory).unwrap_err();

        assert!(matches!(err, SessionError::Storage(_)));
        let calls = host.calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[
                MockCall::ReleaseInterface { interface: 0 },
                MockCall::CloseConnection,
            ]
        );
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_rollback_survives_release_failure() {
        let mut session = make_session();
        let host = mock_host_for(&session).fail_control_in().fail_release();

        let err = session.init(&host, &NullBlockFactory).unwrap_err();

        assert!(matches!(err, SessionError::MaxLun { .. }));
        assert!(host.calls().contains(&MockCall::CloseConnection));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }
}

mod close {
    use super::*;

    #[test]
    fn test_close_releases_and_closes() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();
        let report = session.close().unwrap();

        assert!(report.interface_released);
        assert!(report.connection_closed);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            &host.calls()[3..],
            &[
                MockCall::ReleaseInterface { interface: 0 },
                MockCall::CloseConnection,
            ]
        );
    }

    #[test]
    fn test_close_reports_release_failure() {
        let mut session = make_session();
        let host = mock_host_for(&session).fail_release();

        session.init(&host, &NullBlockFactory).unwrap();
        let report = session.close().unwrap();

        assert!(!report.interface_released);
        assert!(report.connection_closed);
        assert_eq!(session.state(), SessionState::Closed);
        let closes = host
            .calls()
            .iter()
            .filter(|c| **c == MockCall::CloseConnection)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_double_close_is_noop() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();
        session.close().unwrap();
        let calls_before = host.calls().len();

        let report = session.close().unwrap();
        assert!(!report.interface_released);
        assert!(!report.connection_closed);
        assert_eq!(host.calls().len(), calls_before);
    }

    #[test]
    fn test_close_uninitialized_fails() {
        let mut session = make_session();

        let err = session.close().unwrap_err();

        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Uninitialized,
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_close_clears_lun_state() {
        let mut session = make_session();
        let host = mock_host_for(&session).with_max_lun(2);

        session.init(&host, &NullBlockFactory).unwrap();
        assert_eq!(session.max_lun().unwrap(), 2);

        session.close().unwrap();
        assert!(session.max_lun().is_err());
        assert!(session.partitions().is_err());
    }
}

mod accessors {
    use super::*;

    #[test]
    fn test_gated_accessors_before_init() {
        let mut session = make_session();

        assert!(session.transport().is_err());
        assert!(session.block_device().is_err());
        assert!(session.max_lun().is_err());
        assert!(session.lun_count().is_err());
        assert!(session.partitions().is_err());
    }

    #[test]
    fn test_accessors_when_ready() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();

        assert!(session.transport().is_ok());
        assert!(session.block_device().is_ok());
        assert_eq!(session.partitions().unwrap().len(), 0);
    }

    #[test]
    fn test_identity_survives_close() {
        let mut session = make_session();
        let host = mock_host_for(&session);

        session.init(&host, &NullBlockFactory).unwrap();
        session.close().unwrap();

        assert_eq!(session.device().vendor_id, 0x0781);
        assert_eq!(session.interface().number, 0);
        assert_eq!(session.endpoints().bulk_in.address, 0x81);
        assert_eq!(session.endpoints().bulk_out.address, 0x02);
    }
}

mod records {
    use super::*;

    #[test]
    fn test_record_round_trip_is_uninitialized() {
        let mut session = make_session_with_interface(1);
        let host = mock_host_for(&session);
        session.init(&host, &NullBlockFactory).unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let record = session.to_record();
        let restored = Session::from_record(record).unwrap();

        assert_eq!(restored.state(), SessionState::Uninitialized);
        assert_eq!(restored.device().vendor_id, 0x0781);
        assert_eq!(restored.device().product_id, 0x5567);
        assert_eq!(restored.interface().number, 1);
        assert_eq!(restored.endpoints().bulk_in.address, 0x81);
        assert_eq!(restored.endpoints().bulk_out.address, 0x02);
    }

    #[test]
    fn test_record_with_newer_major_version_rejected() {
        let session = make_session();
        let mut record = session.to_record();
        record.version = RecordVersion {
            major: 2,
            minor: 0,
            patch: 0,
        };

        assert!(Session::from_record(record).is_err());
    }

    #[test]
    fn test_restored_session_can_init() {
        let session = make_session();
        let record = session.to_record();
        let mut restored = Session::from_record(record).unwrap();
        let host = mock_host_for(&restored);

        restored.init(&host, &NullBlockFactory).unwrap();
        assert_eq!(restored.state(), SessionState::Ready);
    }
}

mod partitions {
    use super::*;

    #[test]
    fn test_read_partitions() {
        let mut session = make_session();
        let host = mock_host_for(&session);
        let sector =
            create_mbr_sector(&[(true, 0x0C, 2048, 20480), (false, 0x83, 22528, 8192)]);
        let factory = MemoryBlockFactory::new(sector, 512);
        let tables = PartitionTableFactory::new();

        session.init(&host, &factory).unwrap();
        let partitions = session.read_partitions(&tables).unwrap();

        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].index, 0);
        assert!(partitions[0].bootable);
        assert_eq!(partitions[0].type_code, 0x0C);
        assert_eq!(partitions[0].lba_start, 2048);
        assert_eq!(partitions[0].block_count, 20480);
        assert_eq!(partitions[0].byte_offset, 2048 * 512);
        assert_eq!(partitions[0].byte_size, 20480 * 512);
        assert_eq!(partitions[1].type_code, 0x83);

        assert_eq!(session.partitions().unwrap().len(), 2);
    }

    #[test]
    fn test_read_partitions_requires_ready() {
        let mut session = make_session();
        let tables = PartitionTableFactory::new();

        let err = session.read_partitions(&tables).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Uninitialized,
                ..
            }
        ));
    }

    #[test]
    fn test_read_partitions_replaces_previous() {
        let mut session = make_session();
        let host = mock_host_for(&session);
        let sector =
            create_mbr_sector(&[(true, 0x0C, 2048, 20480), (false, 0x83, 22528, 8192)]);
        let factory = MemoryBlockFactory::new(sector, 512);
        let tables = PartitionTableFactory::new();

        session.init(&host, &factory).unwrap();
        assert_eq!(session.read_partitions(&tables).unwrap().len(), 2);

        {
            let image = factory.image();
            let mut bytes = image.lock().unwrap();
            bytes.copy_from_slice(&create_mbr_sector(&[(false, 0x83, 100, 200)]));
        }

        let partitions = session.read_partitions(&tables).unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].lba_start, 100);
    }
}
