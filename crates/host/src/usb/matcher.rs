//! Mass-storage interface matching
//!
//! Decides whether an interface belongs to a bulk-only mass-storage function
//! and selects the bulk endpoint pair used for all further transfers.

use descriptors::consts::{
    EXPECTED_ENDPOINT_COUNT, MASS_STORAGE_CLASS, PROTOCOL_BULK_ONLY, SUBCLASS_SCSI_TRANSPARENT,
};
use descriptors::{EndpointDirection, EndpointPair, InterfaceInfo};
use tracing::warn;

/// Match an interface against the bulk-only mass-storage signature
///
/// The interface must carry the mass-storage class, the SCSI transparent
/// command set and the bulk-only transport protocol. A matching interface
/// contributes its first bulk IN and first bulk OUT endpoints as the pair
/// used for transfers.
///
/// An unexpected endpoint count is logged but tolerated; the scan only fails
/// when either bulk endpoint is missing entirely.
pub fn match_interface(interface: &InterfaceInfo) -> Option<EndpointPair> {
    if interface.class != MASS_STORAGE_CLASS
        || interface.subclass != SUBCLASS_SCSI_TRANSPARENT
        || interface.protocol != PROTOCOL_BULK_ONLY
    {
        return None;
    }

    if interface.endpoints.len() != EXPECTED_ENDPOINT_COUNT {
        warn!(
            "Interface {} has {} endpoints, expected {}",
            interface.number,
            interface.endpoints.len(),
            EXPECTED_ENDPOINT_COUNT
        );
    }

    let mut bulk_in = None;
    let mut bulk_out = None;

    for endpoint in &interface.endpoints {
        if !endpoint.is_bulk() {
            continue;
        }
        match endpoint.direction() {
            EndpointDirection::In => {
                if bulk_in.is_none() {
                    bulk_in = Some(*endpoint);
                }
            }
            EndpointDirection::Out => {
                if bulk_out.is_none() {
                    bulk_out = Some(*endpoint);
                }
            }
        }
    }

    match (bulk_in, bulk_out) {
        (Some(bulk_in), Some(bulk_out)) => Some(EndpointPair { bulk_in, bulk_out }),
        (bulk_in, bulk_out) => {
            warn!(
                "Interface {} is missing bulk endpoints (in: {}, out: {})",
                interface.number,
                bulk_in.is_some(),
                bulk_out.is_some()
            );
            None
        }
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use descriptors::{EndpointInfo, TransferKind};
    use proptest::prelude::*;

    fn transfer_kind_strategy() -> impl Strategy<Value = TransferKind> {
        prop_oneof![
            Just(TransferKind::Control),
            Just(TransferKind::Isochronous),
            Just(TransferKind::Bulk),
            Just(TransferKind::Interrupt),
        ]
    }

    fn endpoint_strategy() -> impl Strategy<Value = EndpointInfo> {
        (any::<u8>(), transfer_kind_strategy(), any::<u16>()).prop_map(
            |(address, transfer, max_packet_size)| EndpointInfo {
                address,
                transfer,
                max_packet_size,
            },
        )
    }

    fn interface_strategy() -> impl Strategy<Value = InterfaceInfo> {
        (
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            proptest::collection::vec(endpoint_strategy(), 0..=8),
        )
            .prop_map(
                |(number, alternate_setting, class, subclass, protocol, endpoints)| {
                    InterfaceInfo {
                        number,
                        alternate_setting,
                        class,
                        subclass,
                        protocol,
                        endpoints,
                    }
                },
            )
    }

    proptest! {
        /// Property: a returned pair is always a bulk IN plus a bulk OUT
        /// drawn from the interface's own endpoints
        #[test]
        fn prop_matched_pair_is_valid(interface in interface_strategy()) {
            if let Some(pair) = match_interface(&interface) {
                prop_assert!(pair.bulk_in.is_bulk());
                prop_assert!(pair.bulk_out.is_bulk());
                prop_assert_eq!(pair.bulk_in.direction(), EndpointDirection::In);
                prop_assert_eq!(pair.bulk_out.direction(), EndpointDirection::Out);
                prop_assert!(interface.endpoints.contains(&pair.bulk_in));
                prop_assert!(interface.endpoints.contains(&pair.bulk_out));
            }
        }

        /// Property: only the exact class/subclass/protocol triple matches
        #[test]
        fn prop_wrong_triple_never_matches(interface in interface_strategy()) {
            if interface.class != MASS_STORAGE_CLASS
                || interface.subclass != SUBCLASS_SCSI_TRANSPARENT
                || interface.protocol != PROTOCOL_BULK_ONLY
            {
                prop_assert!(match_interface(&interface).is_none());
            }
        }
    }
}
