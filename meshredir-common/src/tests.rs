use std::net::Ipv4Addr;
use std::thread;

use crate::addr::{self, from_ip, IpKey, LOOPBACK_V4, LOOPBACK_V6};
use crate::classify::{Classifier, NoResolver};
use crate::connect::{ConnectRequest, ConnectVerdict, Interceptor};
use crate::host::{HashTable, HostMaps, HostSocket, HostSockets, LruTable};
use crate::origin::{OriginInfo, Provenance, INBOUND_FLAG, TC_ORIGIN_FLAG};
use crate::pair::{MarkTuple, Pair};
use crate::pod::{Cidr, PodConfig, POD_FLAG_INBOUND, POD_FLAG_LOOPBACK_REDIRECT};
use crate::recovery::{OriginQuery, OriginSource};
use crate::splice::{EstablishedSocket, Pairing, PairingOutcome};
use crate::table::{Table, TableRead};
use crate::tagger::{SynPacket, TagOutcome};
use crate::{NAT_TABLE_CAPACITY, SIDECAR_UID};

const APP_PID: u32 = 42;
const APP_UID: u32 = 1000;
const SIDECAR_PID: u32 = 77;

fn ip(s: &str) -> IpKey {
    from_ip(s.parse().unwrap())
}

fn raw(s: &str) -> u32 {
    u32::from_ne_bytes(s.parse::<Ipv4Addr>().unwrap().octets())
}

fn pod_ip() -> IpKey {
    ip("10.0.0.5")
}

fn dst_ip() -> IpKey {
    ip("93.184.216.34")
}

fn resolver(pid: u32) -> Option<u32> {
    match pid {
        APP_PID | SIDECAR_PID => Some(raw("10.0.0.5")),
        7 => Some(raw("10.0.0.9")),
        _ => None,
    }
}

fn maps_with_pod(config: PodConfig) -> HostMaps {
    let maps = HostMaps::new();
    maps.pods.insert(&pod_ip(), &config).unwrap();
    maps
}

fn app_connect(cookie: u64, dst: IpKey, dst_port: u16) -> ConnectRequest {
    ConnectRequest {
        cookie,
        pid: APP_PID,
        uid: APP_UID,
        dst,
        dst_port,
        src_port: 0,
    }
}

#[test]
fn outbound_connect_is_redirected_spliced_and_recovered() {
    let maps = maps_with_pod(PodConfig::default());
    let resolver = resolver;

    let verdict = maps
        .interceptor(&resolver)
        .on_connect(&app_connect(1001, dst_ip(), 443));
    assert_eq!(
        verdict,
        ConnectVerdict::Redirect {
            addr: pod_ip(),
            port: 15001
        }
    );
    let origin = OriginInfo::outbound(dst_ip(), 443);
    assert_eq!(maps.origins.get(&1001), Some(origin));
    // Not yet bound: nothing keyed by tuple until establishment.
    assert!(maps.nat.is_empty());

    let pairing = maps.pairing(&resolver);
    let app_pair = Pair::new(pod_ip(), 40000, pod_ip(), 15001);
    let app = EstablishedSocket {
        cookie: 1001,
        pair: app_pair,
    };
    assert_eq!(
        pairing.on_active_established(&app, &mut HostSocket { cookie: 1001 }),
        PairingOutcome::Registered
    );
    assert_eq!(maps.nat.get(&app_pair), Some(origin));
    let requested = Pair::new(pod_ip(), 40000, dst_ip(), 443);
    assert_eq!(maps.nat.get(&requested), Some(origin));
    assert_eq!(origin.flags, 0);

    let sidecar = EstablishedSocket {
        cookie: 2002,
        pair: app_pair.reversed(),
    };
    assert_eq!(
        pairing.on_passive_established(&sidecar, &mut HostSocket { cookie: 2002 }),
        PairingOutcome::Registered
    );
    assert_eq!(maps.sockets.splice_target(&app_pair), Some(2002));
    assert_eq!(maps.sockets.splice_target(&sidecar.pair), Some(1001));

    // The sidecar asks with the reversed tuple of the socket it accepted.
    let query = OriginQuery {
        pair: Some(sidecar.pair.reversed()),
        ..Default::default()
    };
    let recovered = maps.recovery().recover(&query).unwrap();
    assert_eq!(recovered.origin, origin);
    assert_eq!(recovered.source, OriginSource::Tuple);
    assert_eq!(recovered.origin.provenance(), Provenance::Connect);
    assert_eq!(
        addr::to_ip(&recovered.origin.ip),
        "93.184.216.34".parse::<std::net::IpAddr>().unwrap()
    );

    let by_cookie = OriginQuery {
        cookie: Some(1001),
        ..query
    };
    assert_eq!(
        maps.recovery().recover(&by_cookie).unwrap().source,
        OriginSource::Cookie
    );
}

#[test]
fn bound_socket_gets_nat_entry_at_connect() {
    let maps = maps_with_pod(PodConfig::default());
    let req = ConnectRequest {
        src_port: 40000,
        ..app_connect(5, dst_ip(), 443)
    };
    maps.interceptor(&resolver).on_connect(&req);

    let origin = OriginInfo::outbound(dst_ip(), 443);
    let live = Pair::new(pod_ip(), 40000, pod_ip(), 15001);
    let requested = Pair::new(pod_ip(), 40000, dst_ip(), 443);
    assert_eq!(maps.nat.get(&live), Some(origin));
    assert_eq!(maps.nat.get(&requested), Some(origin));
    assert_eq!(maps.nat.len(), 2);
}

#[test]
fn recovery_is_idempotent() {
    let maps = maps_with_pod(PodConfig::default());
    let req = ConnectRequest {
        src_port: 40000,
        ..app_connect(5, dst_ip(), 443)
    };
    maps.interceptor(&resolver).on_connect(&req);

    let query = OriginQuery {
        cookie: Some(5),
        pair: Some(Pair::new(pod_ip(), 40000, pod_ip(), 15001)),
        mark: None,
    };
    let first = maps.recovery().recover(&query);
    let second = maps.recovery().recover(&query);
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[test]
fn unregistered_process_passes_through_untouched() {
    let maps = maps_with_pod(PodConfig::default());
    let req = ConnectRequest {
        pid: 7,
        src_port: 40000,
        ..app_connect(9, dst_ip(), 443)
    };
    assert_eq!(
        maps.interceptor(&resolver).on_connect(&req),
        ConnectVerdict::PassThrough
    );
    assert!(maps.origins.is_empty());
    assert!(maps.nat.is_empty());

    let unknown = ConnectRequest {
        pid: 8,
        ..req
    };
    assert_eq!(
        maps.interceptor(&resolver).on_connect(&unknown),
        ConnectVerdict::PassThrough
    );
    let query = OriginQuery {
        cookie: Some(9),
        ..Default::default()
    };
    assert_eq!(maps.recovery().recover(&query), None);
}

#[test]
fn loopback_destination_passes_through() {
    let maps = maps_with_pod(PodConfig::default());
    for dst in [LOOPBACK_V4, LOOPBACK_V6, ip("127.1.2.3")] {
        assert_eq!(
            maps.interceptor(&resolver).on_connect(&app_connect(1, dst, 80)),
            ConnectVerdict::PassThrough
        );
    }
    assert!(maps.origins.is_empty());
}

#[test]
fn learned_address_needs_no_slow_path() {
    let maps = maps_with_pod(PodConfig::default());
    assert_eq!(
        maps.interceptor(&NoResolver)
            .on_connect(&app_connect(1, dst_ip(), 443)),
        ConnectVerdict::PassThrough
    );

    assert!(maps.pairing(&NoResolver).on_connect_started(APP_PID, &pod_ip()));
    assert_eq!(
        maps.interceptor(&NoResolver)
            .on_connect(&app_connect(2, dst_ip(), 443)),
        ConnectVerdict::Redirect {
            addr: pod_ip(),
            port: 15001
        }
    );
}

#[test]
fn sidecar_own_connections_are_not_looped() {
    let maps = maps_with_pod(PodConfig::default());
    let req = ConnectRequest {
        pid: SIDECAR_PID,
        uid: SIDECAR_UID,
        ..app_connect(3, dst_ip(), 443)
    };
    assert_eq!(
        maps.interceptor(&resolver).on_connect(&req),
        ConnectVerdict::PassThrough
    );

    // An application dialing its own sidecar directly.
    assert_eq!(
        maps.interceptor(&resolver)
            .on_connect(&app_connect(4, pod_ip(), 15001)),
        ConnectVerdict::PassThrough
    );
    assert!(maps.origins.is_empty());
}

#[test]
fn sidecar_to_local_pod_takes_inbound_shortcut() {
    let maps = maps_with_pod(PodConfig::default());
    let peer = ip("10.0.0.7");
    let mut inbound = PodConfig::default();
    inbound.flags = POD_FLAG_INBOUND;
    inbound.exclude_in_ports[0] = 9090;
    maps.pods.insert(&peer, &inbound).unwrap();

    let req = ConnectRequest {
        pid: SIDECAR_PID,
        uid: SIDECAR_UID,
        ..app_connect(11, peer, 8080)
    };
    assert_eq!(
        maps.interceptor(&resolver).on_connect(&req),
        ConnectVerdict::Redirect {
            addr: peer,
            port: 15003
        }
    );
    let origin = maps.origins.get(&11).unwrap();
    assert_eq!(origin.flags, INBOUND_FLAG);
    assert!(origin.is_inbound());
    assert_eq!((origin.ip, origin.port), (peer, 8080));

    let excluded = ConnectRequest {
        cookie: 12,
        dst_port: 9090,
        ..req
    };
    assert_eq!(
        maps.interceptor(&resolver).on_connect(&excluded),
        ConnectVerdict::PassThrough
    );

    // Pods without the inbound flag are left alone.
    let to_self = ConnectRequest {
        cookie: 13,
        dst: pod_ip(),
        ..req
    };
    assert_eq!(
        maps.interceptor(&resolver).on_connect(&to_self),
        ConnectVerdict::PassThrough
    );
}

#[test]
fn sidecar_does_not_shortcut_into_its_own_pod() {
    let mut config = PodConfig::default();
    config.flags = POD_FLAG_INBOUND;
    let maps = maps_with_pod(config);
    let req = ConnectRequest {
        pid: SIDECAR_PID,
        uid: SIDECAR_UID,
        ..app_connect(14, pod_ip(), 8080)
    };
    assert_eq!(
        maps.interceptor(&resolver).on_connect(&req),
        ConnectVerdict::PassThrough
    );
}

#[test]
fn exclusions_bypass_the_sidecar() {
    let mut config = PodConfig::default();
    config.exclude_out_ports[0] = 3306;
    config.exclude_out_ranges[0] = Cidr::new(ip("169.254.169.254"), 128);
    let maps = maps_with_pod(config);
    let interceptor = maps.interceptor(&resolver);

    assert_eq!(
        interceptor.on_connect(&app_connect(1, dst_ip(), 3306)),
        ConnectVerdict::PassThrough
    );
    assert_eq!(
        interceptor.on_connect(&app_connect(2, ip("169.254.169.254"), 80)),
        ConnectVerdict::PassThrough
    );
    assert!(maps.origins.is_empty());
    assert!(matches!(
        interceptor.on_connect(&app_connect(3, dst_ip(), 80)),
        ConnectVerdict::Redirect { .. }
    ));
}

#[test]
fn include_ranges_limit_interception() {
    let mut config = PodConfig::default();
    config.include_out_ranges[0] = Cidr::new(ip("10.0.0.0"), 96 + 8);
    let maps = maps_with_pod(config);
    let interceptor = maps.interceptor(&resolver);

    assert_eq!(
        interceptor.on_connect(&app_connect(1, dst_ip(), 443)),
        ConnectVerdict::PassThrough
    );
    assert!(matches!(
        interceptor.on_connect(&app_connect(2, ip("10.1.2.3"), 443)),
        ConnectVerdict::Redirect { .. }
    ));
}

#[test]
fn loopback_redirect_and_family_guard() {
    let maps = maps_with_pod(PodConfig::default());
    assert_eq!(
        maps.interceptor(&resolver)
            .on_connect(&app_connect(1, ip("2001:db8::1"), 443)),
        ConnectVerdict::PassThrough
    );

    let mut config = PodConfig::default();
    config.flags = POD_FLAG_LOOPBACK_REDIRECT;
    let maps = maps_with_pod(config);
    let interceptor = maps.interceptor(&resolver);
    assert_eq!(
        interceptor.on_connect(&app_connect(2, dst_ip(), 443)),
        ConnectVerdict::Redirect {
            addr: LOOPBACK_V4,
            port: 15001
        }
    );
    assert_eq!(
        interceptor.on_connect(&app_connect(3, ip("2001:db8::1"), 443)),
        ConnectVerdict::Redirect {
            addr: LOOPBACK_V6,
            port: 15001
        }
    );
}

#[test]
fn failed_nat_insert_leaves_no_origin() {
    let pods = HashTable::new(4);
    pods.insert(&pod_ip(), &PodConfig::default()).unwrap();
    let processes = LruTable::new(4);
    let origins = LruTable::new(4);
    let nat: HashTable<Pair, OriginInfo> = HashTable::new(0);
    let interceptor = Interceptor {
        classifier: Classifier {
            pods: &pods,
            processes: &processes,
            resolver: &resolver,
        },
        origins: &origins,
        nat: &nat,
    };

    let req = ConnectRequest {
        src_port: 40000,
        ..app_connect(1, dst_ip(), 443)
    };
    assert_eq!(interceptor.on_connect(&req), ConnectVerdict::PassThrough);
    assert!(origins.is_empty());
}

#[test]
fn close_removes_both_directions() {
    let maps = maps_with_pod(PodConfig::default());
    maps.interceptor(&resolver)
        .on_connect(&app_connect(1001, dst_ip(), 443));
    let pairing = maps.pairing(&resolver);
    let app_pair = Pair::new(pod_ip(), 40000, pod_ip(), 15001);
    pairing.on_active_established(
        &EstablishedSocket {
            cookie: 1001,
            pair: app_pair,
        },
        &mut HostSocket { cookie: 1001 },
    );
    pairing.on_passive_established(
        &EstablishedSocket {
            cookie: 2002,
            pair: app_pair.reversed(),
        },
        &mut HostSocket { cookie: 2002 },
    );
    assert_eq!(maps.sockets.len(), 2);

    pairing.on_close(&app_pair.reversed());
    assert!(maps.sockets.is_empty());
    assert_eq!(maps.sockets.splice_target(&app_pair), None);
    assert_eq!(maps.sockets.splice_target(&app_pair.reversed()), None);

    // Closing again is harmless.
    pairing.on_close(&app_pair);
}

#[test]
fn unrelated_sockets_are_ignored() {
    let maps = maps_with_pod(PodConfig::default());
    let pairing = maps.pairing(&resolver);
    let pair = Pair::new(pod_ip(), 40001, dst_ip(), 443);
    let sock = EstablishedSocket { cookie: 5, pair };

    assert_eq!(
        pairing.on_active_established(&sock, &mut HostSocket { cookie: 5 }),
        PairingOutcome::Ignored
    );
    assert_eq!(
        pairing.on_passive_established(&sock, &mut HostSocket { cookie: 5 }),
        PairingOutcome::Ignored
    );
    assert!(maps.sockets.is_empty());
}

#[test]
fn full_socket_table_falls_back() {
    let maps = maps_with_pod(PodConfig::default());
    let sockets = HostSockets::new(1);
    let pairing = Pairing {
        classifier: maps.classifier(&resolver),
        origins: &maps.origins,
        nat: &maps.nat,
        sockets: &sockets,
    };
    let interceptor = maps.interceptor(&resolver);
    interceptor.on_connect(&app_connect(1, dst_ip(), 443));
    interceptor.on_connect(&app_connect(2, dst_ip(), 443));

    let first = EstablishedSocket {
        cookie: 1,
        pair: Pair::new(pod_ip(), 40000, pod_ip(), 15001),
    };
    let second = EstablishedSocket {
        cookie: 2,
        pair: Pair::new(pod_ip(), 40001, pod_ip(), 15001),
    };
    assert_eq!(
        pairing.on_active_established(&first, &mut HostSocket { cookie: 1 }),
        PairingOutcome::Registered
    );
    assert_eq!(
        pairing.on_active_established(&second, &mut HostSocket { cookie: 2 }),
        PairingOutcome::Fallback
    );
    // Origin still recoverable through the normal path.
    assert!(maps.nat.get(&second.pair).is_some());
}

#[test]
fn nat_table_evicts_instead_of_failing() {
    let maps = maps_with_pod(PodConfig::default());
    let origin = OriginInfo::outbound(dst_ip(), 443);
    let total = NAT_TABLE_CAPACITY + 4465;
    for i in 0..total {
        let key = Pair::new(addr::from_ipv4_raw(i), 1, pod_ip(), 15001);
        maps.nat.insert(&key, &origin).unwrap();
    }
    assert_eq!(maps.nat.len(), NAT_TABLE_CAPACITY as usize);
    let oldest = Pair::new(addr::from_ipv4_raw(0), 1, pod_ip(), 15001);
    let newest = Pair::new(addr::from_ipv4_raw(total - 1), 1, pod_ip(), 15001);
    assert_eq!(maps.nat.get(&oldest), None);
    assert_eq!(maps.nat.get(&newest), Some(origin));

    let req = ConnectRequest {
        src_port: 40000,
        ..app_connect(77, dst_ip(), 443)
    };
    assert!(matches!(
        maps.interceptor(&resolver).on_connect(&req),
        ConnectVerdict::Redirect { .. }
    ));
    assert_eq!(
        maps.nat.get(&Pair::new(pod_ip(), 40000, pod_ip(), 15001)),
        Some(origin)
    );
}

#[test]
fn concurrent_connects_never_fail() {
    let maps = maps_with_pod(PodConfig::default());
    let per_thread = 20_000u32;

    thread::scope(|scope| {
        for t in 0..4u32 {
            let maps = &maps;
            scope.spawn(move || {
                let resolver = resolver;
                let interceptor = maps.interceptor(&resolver);
                for i in 0..per_thread {
                    let n = t * per_thread + i;
                    let req = ConnectRequest {
                        cookie: n as u64 + 1,
                        pid: APP_PID,
                        uid: APP_UID,
                        dst: dst_ip(),
                        dst_port: 443,
                        src_port: 0,
                    };
                    assert!(matches!(
                        interceptor.on_connect(&req),
                        ConnectVerdict::Redirect { .. }
                    ));
                }
            });
        }
    });

    assert_eq!(maps.origins.len(), 65535);
}

#[test]
fn mark_correlation_recovers_tc_origin() {
    let maps = maps_with_pod(PodConfig::default());
    let pkt = SynPacket {
        mark: 777,
        saddr: raw("10.0.0.5"),
        sport: 40000,
        daddr: raw("93.184.216.34"),
        dport: 443,
    };
    assert_eq!(maps.tagger().on_syn(&pkt), TagOutcome::Tagged);
    assert_eq!(
        maps.marks.get(&777),
        Some(MarkTuple::new(
            raw("10.0.0.5"),
            40000,
            raw("93.184.216.34"),
            443
        ))
    );

    let recovered = maps
        .recovery()
        .recover(&OriginQuery {
            mark: Some(777),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(recovered.source, OriginSource::Mark);
    assert_eq!(recovered.origin.ip, dst_ip());
    assert_eq!(recovered.origin.port, 443);
    assert_eq!(recovered.origin.flags, TC_ORIGIN_FLAG);
    assert_eq!(recovered.origin.provenance(), Provenance::TrafficControl);

    // The tagger's NAT record answers tuple queries too.
    let by_tuple = maps
        .recovery()
        .recover(&OriginQuery {
            pair: Some(Pair::new(pod_ip(), 40000, dst_ip(), 443)),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_tuple.origin.provenance(), Provenance::TrafficControl);
}

#[test]
fn unmarked_or_unknown_mark_is_not_mesh_managed() {
    let maps = HostMaps::new();
    let pkt = SynPacket {
        mark: 0,
        saddr: raw("10.0.0.5"),
        sport: 40000,
        daddr: raw("93.184.216.34"),
        dport: 443,
    };
    assert_eq!(maps.tagger().on_syn(&pkt), TagOutcome::Skipped);
    assert!(maps.marks.is_empty());

    for mark in [Some(0), Some(778), None] {
        let query = OriginQuery {
            mark,
            ..Default::default()
        };
        assert_eq!(maps.recovery().recover(&query), None);
    }
}

#[test]
fn tagger_never_overwrites_connect_records() {
    let maps = maps_with_pod(PodConfig::default());
    let pair = Pair::new(pod_ip(), 40000, dst_ip(), 443);
    let connect = OriginInfo::outbound(ip("1.1.1.1"), 53);
    maps.nat.insert(&pair, &connect).unwrap();

    let pkt = SynPacket {
        mark: 9,
        saddr: raw("10.0.0.5"),
        sport: 40000,
        daddr: raw("93.184.216.34"),
        dport: 443,
    };
    assert_eq!(maps.tagger().on_syn(&pkt), TagOutcome::MarkOnly);
    assert_eq!(maps.nat.get(&pair), Some(connect));
    assert!(maps.marks.get(&9).is_some());
}

#[test]
fn tagger_skips_syns_to_a_sidecar() {
    let maps = maps_with_pod(PodConfig::default());
    let pkt = SynPacket {
        mark: 5,
        saddr: raw("10.0.0.5"),
        sport: 40000,
        daddr: raw("10.0.0.5"),
        dport: 15001,
    };
    assert_eq!(maps.tagger().on_syn(&pkt), TagOutcome::Skipped);
    assert!(maps.marks.is_empty());
    assert!(maps.nat.is_empty());
}

fn marked_syn(mark: u32, src: &str, sport: u16, dst: &str, dport: u16) -> SynPacket {
    SynPacket {
        mark,
        saddr: raw(src),
        sport,
        daddr: raw(dst),
        dport,
    }
}

#[test]
fn colliding_mark_is_not_trusted() {
    let maps = HostMaps::new();
    let other = marked_syn(777, "10.0.0.9", 50000, "1.1.1.1", 53);
    assert_eq!(maps.tagger().on_syn(&other), TagOutcome::Tagged);

    // The sidecar asks about 10.0.0.5:40000; mark 777 belongs to 10.0.0.9.
    let query = OriginQuery {
        pair: Some(Pair::new(pod_ip(), 40000, pod_ip(), 15001)),
        mark: Some(777),
        ..Default::default()
    };
    assert_eq!(maps.recovery().recover(&query), None);

    let matching = OriginQuery {
        pair: Some(Pair::new(ip("10.0.0.9"), 50000, pod_ip(), 15001)),
        mark: Some(777),
        ..Default::default()
    };
    let recovered = maps.recovery().recover(&matching).unwrap();
    assert_eq!(recovered.source, OriginSource::Mark);
    assert_eq!(recovered.origin.ip, ip("1.1.1.1"));
    assert_eq!(recovered.origin.port, 53);
}

#[test]
fn reused_mark_answers_with_latest_tuple() {
    let maps = HostMaps::new();
    let first = marked_syn(777, "10.0.0.5", 40000, "93.184.216.34", 443);
    let second = marked_syn(777, "10.0.0.5", 40001, "1.1.1.1", 853);
    assert_eq!(maps.tagger().on_syn(&first), TagOutcome::Tagged);
    assert_eq!(maps.tagger().on_syn(&second), TagOutcome::Tagged);
    assert_eq!(maps.marks.len(), 1);

    let query = OriginQuery {
        mark: Some(777),
        ..Default::default()
    };
    let recovered = maps.recovery().recover(&query).unwrap();
    assert_eq!(recovered.origin.ip, ip("1.1.1.1"));
    assert_eq!(recovered.origin.port, 853);

    // The earlier connection still resolves through its own NAT record.
    let earlier = OriginQuery {
        pair: Some(Pair::new(pod_ip(), 40000, dst_ip(), 443)),
        mark: Some(777),
        ..Default::default()
    };
    let recovered = maps.recovery().recover(&earlier).unwrap();
    assert_eq!(recovered.source, OriginSource::Tuple);
    assert_eq!(recovered.origin.ip, dst_ip());
}

#[test]
fn mark_table_evicts_instead_of_failing() {
    let maps = HostMaps::new();
    for mark in 1..=crate::MARK_TUPLES_CAPACITY {
        let syn = SynPacket {
            mark,
            saddr: raw("10.0.0.5"),
            sport: (mark % 60000) as u16 + 1024,
            daddr: raw("93.184.216.34"),
            dport: 443 + (mark / 60000) as u16,
        };
        assert_eq!(maps.tagger().on_syn(&syn), TagOutcome::Tagged);
    }
    assert_eq!(maps.marks.len(), crate::MARK_TUPLES_CAPACITY as usize);

    let late = marked_syn(900000, "10.0.0.6", 41000, "8.8.8.8", 443);
    assert_eq!(maps.tagger().on_syn(&late), TagOutcome::Tagged);
    assert_eq!(maps.marks.len(), crate::MARK_TUPLES_CAPACITY as usize);
    assert!(maps.marks.get(&1).is_none());
    assert!(maps.marks.get(&900000).is_some());

    let record = maps
        .nat
        .get(&Pair::new(ip("10.0.0.6"), 41000, ip("8.8.8.8"), 443))
        .unwrap();
    assert_eq!(record.provenance(), Provenance::TrafficControl);
}

#[test]
fn tagger_records_nat_when_mark_insert_fails() {
    let pods: HashTable<IpKey, PodConfig> = HashTable::new(1);
    let nat: LruTable<Pair, OriginInfo> = LruTable::new(NAT_TABLE_CAPACITY);
    let marks: HashTable<u32, MarkTuple> = HashTable::new(1);
    marks
        .insert(&1, &MarkTuple::new(raw("10.0.0.9"), 1, raw("1.1.1.1"), 53))
        .unwrap();
    let tagger = crate::tagger::Tagger {
        pods: &pods,
        nat: &nat,
        marks: &marks,
    };

    let syn = marked_syn(2, "10.0.0.6", 41000, "8.8.8.8", 443);
    assert_eq!(tagger.on_syn(&syn), TagOutcome::NatOnly);
    assert!(marks.get(&2).is_none());
    let record = nat
        .get(&Pair::new(ip("10.0.0.6"), 41000, ip("8.8.8.8"), 443))
        .unwrap();
    assert_eq!(record.flags, TC_ORIGIN_FLAG);
}
