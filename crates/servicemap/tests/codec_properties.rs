use proptest::prelude::*;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use svcmap_core::codec::{Encoder, Versioned};
use svcmap_core::{
    decode_from_slice, encode_to_vec, AddrType, Daemon, DecodeError, EntityAddr, Features,
    Service, ServiceMap, UTime,
};

fn addr_type_strategy() -> impl Strategy<Value = AddrType> {
    prop_oneof![
        Just(AddrType::None),
        Just(AddrType::Legacy),
        Just(AddrType::Msgr2),
        Just(AddrType::Any),
    ]
}

fn sockaddr_strategy() -> impl Strategy<Value = Option<SocketAddr>> {
    prop_oneof![
        Just(None),
        (any::<[u8; 4]>(), any::<u16>()).prop_map(|(ip, port)| Some(SocketAddr::V4(
            SocketAddrV4::new(Ipv4Addr::from(ip), port)
        ))),
        (any::<[u8; 16]>(), any::<u16>(), any::<u32>(), any::<u32>()).prop_map(
            |(ip, port, flowinfo, scope_id)| Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(ip),
                port,
                flowinfo,
                scope_id
            )))
        ),
    ]
}

fn addr_strategy() -> impl Strategy<Value = EntityAddr> {
    (addr_type_strategy(), any::<u32>(), sockaddr_strategy()).prop_map(
        |(addr_type, nonce, sockaddr)| EntityAddr {
            addr_type,
            nonce,
            sockaddr,
        },
    )
}

fn string_map_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z_]{1,12}", ".{0,16}", 0..5)
}

fn daemon_strategy() -> impl Strategy<Value = Daemon> {
    (
        any::<u64>(),
        addr_strategy(),
        any::<u64>(),
        (any::<u32>(), 0u32..1_000_000_000),
        string_map_strategy(),
        string_map_strategy(),
    )
        .prop_map(
            |(gid, addr, start_epoch, (sec, nsec), metadata, task_status)| Daemon {
                gid,
                addr,
                start_epoch,
                start_stamp: UTime::new(sec, nsec),
                metadata,
                task_status,
            },
        )
}

fn service_strategy() -> impl Strategy<Value = Service> {
    (
        prop::collection::btree_map("[a-z0-9.]{1,10}", daemon_strategy(), 0..4),
        prop_oneof![Just(String::new()), ".{1,24}"],
    )
        .prop_map(|(daemons, summary)| Service { daemons, summary })
}

fn service_map_strategy() -> impl Strategy<Value = ServiceMap> {
    (
        any::<u64>(),
        (any::<u32>(), 0u32..1_000_000_000),
        prop::collection::btree_map("[a-z]{1,8}", service_strategy(), 0..3),
    )
        .prop_map(|(epoch, (sec, nsec), services)| ServiceMap {
            epoch,
            modified: UTime::new(sec, nsec),
            services,
        })
}

fn features_strategy() -> impl Strategy<Value = Features> {
    prop_oneof![Just(Features::legacy()), Just(Features::modern())]
}

/// Writes `daemon` the way a schema v1 peer would.
fn encode_daemon_v1(daemon: &Daemon, features: Features) -> Vec<u8> {
    let mut enc = Encoder::new(features);
    enc.versioned(1, 1, |enc| {
        enc.encode(&daemon.gid);
        enc.encode(&daemon.addr);
        enc.encode(&daemon.start_epoch);
        enc.encode(&daemon.start_stamp);
        enc.encode(&daemon.metadata);
    });
    enc.into_bytes()
}

/// **Property: Round-trip fidelity**
/// *For any* service map and either address representation, decoding the
/// encoded bytes yields an equal value.
#[test]
fn property_service_map_round_trip() {
    proptest!(|(
        map in service_map_strategy(),
        features in features_strategy(),
    )| {
        let bytes = encode_to_vec(&map, features);
        let decoded: ServiceMap = decode_from_slice(&bytes).unwrap();
        prop_assert_eq!(decoded, map);
    });
}

/// **Property: Daemon round-trip fidelity**
#[test]
fn property_daemon_round_trip() {
    proptest!(|(
        daemon in daemon_strategy(),
        features in features_strategy(),
    )| {
        let decoded: Daemon = decode_from_slice(&encode_to_vec(&daemon, features)).unwrap();
        prop_assert_eq!(decoded, daemon);
    });
}

/// A link-local daemon address keeps its scope id under both encodings.
#[test]
fn test_link_local_daemon_round_trip() {
    let mut daemon = Daemon::with_gid(7);
    daemon.addr = EntityAddr::new(
        AddrType::Msgr2,
        SocketAddr::V6(SocketAddrV6::new("fe80::1".parse().unwrap(), 7480, 0, 2)),
        3,
    );
    for features in [Features::legacy(), Features::modern()] {
        let decoded: Daemon = decode_from_slice(&encode_to_vec(&daemon, features)).unwrap();
        assert_eq!(decoded.addr.legacy_str(), "[fe80::1%2]:7480/3");
        assert_eq!(decoded, daemon);
    }
}

/// **Property: Backward compatibility**
/// *For any* daemon written by a schema v1 peer, decoding keeps every v1
/// field and leaves task_status empty.
#[test]
fn property_v1_daemon_defaults_task_status() {
    proptest!(|(
        daemon in daemon_strategy(),
        features in features_strategy(),
    )| {
        let decoded: Daemon = decode_from_slice(&encode_daemon_v1(&daemon, features)).unwrap();

        prop_assert!(decoded.task_status.is_empty());
        prop_assert_eq!(decoded.gid, daemon.gid);
        prop_assert_eq!(decoded.addr, daemon.addr);
        prop_assert_eq!(decoded.start_epoch, daemon.start_epoch);
        prop_assert_eq!(decoded.start_stamp, daemon.start_stamp);
        prop_assert_eq!(&decoded.metadata, &daemon.metadata);
    });
}

/// **Property: Forward compatibility**
/// *For any* service written by a newer peer that appended unknown fields
/// (while keeping compat at 1), the reader recovers the known fields.
#[test]
fn property_trailing_fields_skipped() {
    proptest!(|(
        service in service_strategy(),
        extra in prop::collection::vec(any::<u8>(), 0..64),
        newer_version in 2u8..=255,
    )| {
        let mut enc = Encoder::new(Features::modern());
        enc.versioned(newer_version, 1, |enc| {
            enc.encode(&service.daemons);
            enc.encode(&service.summary);
            enc.put_bytes(&extra);
        });
        let decoded: Service = decode_from_slice(&enc.into_bytes()).unwrap();
        prop_assert_eq!(decoded, service);
    });
}

/// **Property: Version rejection**
/// *For any* compat version above the reader's, decode fails with
/// VersionMismatch and never returns a partial value.
#[test]
fn property_newer_compat_rejected() {
    proptest!(|(
        daemon in daemon_strategy(),
        compat in (Daemon::VERSION + 1)..=255u8,
    )| {
        let mut enc = Encoder::new(Features::modern());
        enc.versioned(compat, compat, |enc| {
            enc.encode(&daemon.gid);
            enc.encode(&daemon.addr);
        });
        let err = decode_from_slice::<Daemon>(&enc.into_bytes()).unwrap_err();
        prop_assert_eq!(
            err,
            DecodeError::VersionMismatch {
                type_name: "Daemon",
                reader: Daemon::VERSION,
                required: compat,
            }
        );
    });
}

/// **Property: Truncation detection**
/// *For any* strict prefix of a valid payload, decode fails as Malformed.
#[test]
fn property_truncated_payload_malformed() {
    proptest!(|(
        map in service_map_strategy(),
        features in features_strategy(),
        cut_seed in any::<usize>(),
    )| {
        let bytes = encode_to_vec(&map, features);
        let cut = cut_seed % bytes.len();
        let err = decode_from_slice::<ServiceMap>(&bytes[..cut]).unwrap_err();
        prop_assert!(matches!(err, DecodeError::Malformed { .. }), "cut {} gave {:?}", cut, err);
    });
}

/// Nested entities carry their own envelopes: a Service inside a
/// ServiceMap is rejected on its own compat even when the outer map is fine.
#[test]
fn test_nested_version_mismatch_propagates() {
    let mut enc = Encoder::new(Features::modern());
    enc.versioned(1, 1, |enc| {
        enc.encode(&1u64);
        enc.encode(&UTime::default());
        enc.put_u32(1);
        enc.encode("rgw");
        enc.versioned(2, 2, |enc| enc.put_u32(0));
    });

    let err = decode_from_slice::<ServiceMap>(&enc.into_bytes()).unwrap_err();
    assert_eq!(
        err,
        DecodeError::VersionMismatch {
            type_name: "Service",
            reader: 1,
            required: 2,
        }
    );
}

/// An old reader of a daemon inside a service still finds the next daemon.
#[test]
fn test_mixed_daemon_versions_in_one_service() {
    let mut old = Daemon::with_gid(1);
    old.metadata.insert("version".to_string(), "old".to_string());
    let mut new = Daemon::with_gid(2);
    new.task_status.insert("sync".to_string(), "running".to_string());

    let mut enc = Encoder::new(Features::legacy());
    enc.versioned(1, 1, |enc| {
        enc.put_u32(2);
        enc.encode("a");
        enc.put_bytes(&encode_daemon_v1(&old, Features::legacy()));
        enc.encode("b");
        enc.encode(&new);
        enc.encode("");
    });

    let service: Service = decode_from_slice(&enc.into_bytes()).unwrap();
    assert_eq!(service.daemons["a"], old);
    assert_eq!(service.daemons["b"], new);
    assert!(service.has_running_tasks());
}
