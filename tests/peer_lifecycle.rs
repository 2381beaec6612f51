//! End-to-end scenarios for the per-peer path manager.
//!
//! These tests drive `PeerPaths` through its public interface against an
//! in-test host environment: a recording packet sink, a scripted clock,
//! scripted direct paths / NAT predictions, and an optional cluster.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft::{
    Address, AddressFamily, Cluster, Identity, InetAddress, IpScope, Keypair, Network, Node,
    Packet, Path, PeerPaths, Runtime, SelfAwareness, SessionKey, Topology, Verb,
    DIRECT_PATH_PUSH_INTERVAL, MAX_PER_SCOPE_AND_FAMILY, MULTICAST_LIKE_EXPIRE, PATH_EXPIRATION,
    PATH_HEARTBEAT_PERIOD, PING_PERIOD, PUSH_FLAG_CLUSTER_REDIRECT, PUSH_MTU,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Test host environment
// ============================================================================

type SentPacket = (InetAddress, InetAddress, Vec<u8>);

struct TestNode {
    now: AtomicU64,
    sent: Mutex<Vec<SentPacket>>,
    direct: Mutex<Vec<InetAddress>>,
    networks: Mutex<Vec<Arc<dyn Network>>>,
    prng_state: AtomicU64,
    permit_paths: AtomicBool,
}

impl TestNode {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            direct: Mutex::new(Vec::new()),
            networks: Mutex::new(Vec::new()),
            prng_state: AtomicU64::new(0),
            permit_paths: AtomicBool::new(true),
        })
    }

    fn set_now(&self, t: u64) {
        self.now.store(t, Ordering::Relaxed);
    }

    fn sent(&self) -> Vec<SentPacket> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Node for TestNode {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn put_packet(&self, local: &InetAddress, remote: &InetAddress, data: &[u8]) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((local.clone(), remote.clone(), data.to_vec()));
        true
    }

    fn all_networks(&self) -> Vec<Arc<dyn Network>> {
        self.networks.lock().unwrap().clone()
    }

    fn direct_paths(&self) -> Vec<InetAddress> {
        self.direct.lock().unwrap().clone()
    }

    fn prng(&self) -> u64 {
        self.prng_state.fetch_add(1, Ordering::Relaxed)
    }

    fn should_use_path_for_overlay(&self, _local: &InetAddress, _remote: &InetAddress) -> bool {
        self.permit_paths.load(Ordering::Relaxed)
    }
}

struct TestAwareness {
    predictions: Mutex<Vec<InetAddress>>,
}

impl SelfAwareness for TestAwareness {
    fn symmetric_nat_predictions(&self) -> Vec<InetAddress> {
        self.predictions.lock().unwrap().clone()
    }
}

struct TestTopology;

impl Topology for TestTopology {
    fn world_id(&self) -> u64 {
        0x1f2e3d4c
    }
    fn world_timestamp(&self) -> u64 {
        1_700_000_000_000
    }
}

struct TestCluster {
    better: Mutex<Option<InetAddress>>,
    have_peer: Mutex<Vec<Address>>,
}

impl TestCluster {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            better: Mutex::new(None),
            have_peer: Mutex::new(Vec::new()),
        })
    }
}

impl Cluster for TestCluster {
    fn find_better_endpoint(
        &self,
        _peer: Address,
        _current_remote: &InetAddress,
        _force: bool,
    ) -> Option<InetAddress> {
        self.better.lock().unwrap().clone()
    }

    fn broadcast_have_peer(&self, peer: Address) {
        self.have_peer.lock().unwrap().push(peer);
    }
}

struct TestNetwork {
    announces: AtomicUsize,
}

impl Network for TestNetwork {
    fn try_announce_multicast_groups_to(&self, _peer: &PeerPaths) {
        self.announces.fetch_add(1, Ordering::SeqCst);
    }
}

struct Host {
    node: Arc<TestNode>,
    aware: Arc<TestAwareness>,
    cluster: Option<Arc<TestCluster>>,
    rt: Arc<Runtime>,
    peer_kp: Keypair,
}

impl Host {
    fn new(clustered: bool) -> Self {
        let node = TestNode::new();
        let aware = Arc::new(TestAwareness {
            predictions: Mutex::new(Vec::new()),
        });
        let cluster = if clustered { Some(TestCluster::new()) } else { None };
        let rt = Arc::new(Runtime {
            node: Arc::clone(&node) as Arc<dyn Node>,
            self_awareness: Arc::clone(&aware) as Arc<dyn SelfAwareness>,
            topology: Arc::new(TestTopology),
            cluster: cluster
                .as_ref()
                .map(|c| Arc::clone(c) as Arc<dyn Cluster>),
            local: Keypair::generate(),
        });
        Self {
            node,
            aware,
            cluster,
            rt,
            peer_kp: Keypair::generate(),
        }
    }

    fn peer(&self) -> PeerPaths {
        PeerPaths::new(Arc::clone(&self.rt), *self.peer_kp.identity()).expect("peer construction")
    }

    fn session_key(&self) -> SessionKey {
        self.peer_kp
            .agree(self.rt.local.identity())
            .expect("peer-side agreement")
    }

    /// Dearmored `(verb, payload)` of every framed packet sent so far.
    /// Raw NAT keepalives (too short to be frames) are skipped.
    fn framed_sent(&self) -> Vec<(Verb, Vec<u8>)> {
        let key = self.session_key();
        self.node
            .sent()
            .iter()
            .filter_map(|(_, _, bytes)| {
                let mut packet = Packet::from_bytes(bytes.clone()).ok()?;
                packet.dearmor(&key).expect("dearmor of sent packet");
                Some((packet.verb().expect("verb"), packet.payload().to_vec()))
            })
            .collect()
    }

    fn sent_with_verb(&self, verb: Verb) -> Vec<Vec<u8>> {
        self.framed_sent()
            .into_iter()
            .filter(|(v, _)| *v == verb)
            .map(|(_, p)| p)
            .collect()
    }
}

fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> InetAddress {
    InetAddress::V4 {
        ip: [a, b, c, d],
        port,
    }
}

fn v6(last: u8, port: u16) -> InetAddress {
    let mut ip = [0u8; 16];
    ip[0] = 0x2a;
    ip[1] = 0x03;
    ip[15] = last;
    InetAddress::V6 { ip, port }
}

fn local_bind() -> InetAddress {
    v4(192, 0, 2, 1, 9993)
}

fn path_to(remote: InetAddress) -> Arc<Path> {
    Arc::new(Path::new(local_bind(), remote))
}

/// Parse a PUSH_DIRECT_PATHS payload into `(flags, endpoint)` records.
fn parse_push_records(payload: &[u8]) -> Vec<(u8, InetAddress)> {
    let count = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let mut records = Vec::with_capacity(count);
    let mut off = 2usize;
    for _ in 0..count {
        let flags = payload[off];
        let ext_len = u16::from_be_bytes([payload[off + 1], payload[off + 2]]) as usize;
        off += 3 + ext_len;
        let addr_type = payload[off];
        let entry_len = payload[off + 1] as usize;
        off += 2;
        let addr = match addr_type {
            4 => {
                let mut ip = [0u8; 4];
                ip.copy_from_slice(&payload[off..off + 4]);
                let port = u16::from_be_bytes([payload[off + 4], payload[off + 5]]);
                InetAddress::V4 { ip, port }
            }
            6 => {
                let mut ip = [0u8; 16];
                ip.copy_from_slice(&payload[off..off + 16]);
                let port = u16::from_be_bytes([payload[off + 16], payload[off + 17]]);
                InetAddress::V6 { ip, port }
            }
            other => panic!("unknown push record address type {}", other),
        };
        off += entry_len;
        records.push((flags, addr));
    }
    records
}

// ============================================================================
// Learning and probing
// ============================================================================

#[test]
fn learn_via_ok_installs_path_without_output() {
    init_tracing();
    let host = Host::new(false);
    let peer = host.peer();
    let remote = v4(198, 51, 100, 7, 9993);

    host.node.set_now(1000);
    peer.received(&path_to(remote.clone()), 0, Verb::Ok, false);

    assert_eq!(peer.num_paths(), 1);
    let snap = peer.paths(1000);
    assert_eq!(snap[0].address, remote);
    assert_eq!(snap[0].local_address, local_bind());
    assert_eq!(snap[0].last_receive, 1000);
    assert_eq!(host.node.sent_count(), 0, "learning must be silent");
}

#[test]
fn unknown_path_is_probed_with_echo_for_modern_peers() {
    let host = Host::new(false);
    let peer = host.peer();
    peer.set_remote_version(5, 1, 2, 0);

    host.node.set_now(1000);
    peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 0, Verb::Frame, false);

    assert_eq!(peer.num_paths(), 0, "FRAME must not install a path");
    let frames = host.framed_sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, Verb::Echo);
    assert!(frames[0].1.is_empty(), "ECHO payload is empty");
}

#[test]
fn unknown_path_is_probed_with_hello_for_ancient_peers() {
    let host = Host::new(false);
    let peer = host.peer();
    peer.set_remote_version(4, 1, 2, 0);

    host.node.set_now(1000);
    peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 0, Verb::Frame, false);

    let frames = host.framed_sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, Verb::Hello);
}

#[test]
fn unknown_path_is_probed_with_hello_for_1_1_0() {
    let host = Host::new(false);
    let peer = host.peer();
    peer.set_remote_version(5, 1, 1, 0);

    host.node.set_now(1000);
    peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 0, Verb::Frame, false);

    let frames = host.framed_sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, Verb::Hello);
}

#[test]
fn hello_payload_is_well_formed() {
    let host = Host::new(false);
    let peer = host.peer();

    host.node.set_now(123_456);
    let at = v4(198, 51, 100, 7, 9993);
    peer.send_hello(&local_bind(), &at, 123_456);

    let hellos = host.sent_with_verb(Verb::Hello);
    assert_eq!(hellos.len(), 1);
    let p = &hellos[0];

    assert_eq!(p[0], weft::PROTO_VERSION);
    assert_eq!(p[1], weft::VERSION_MAJOR);
    assert_eq!(p[2], weft::VERSION_MINOR);
    assert_eq!(u16::from_be_bytes([p[3], p[4]]), weft::VERSION_REVISION);
    let ts = u64::from_be_bytes(p[5..13].try_into().unwrap());
    assert_eq!(ts, 123_456);

    let (identity, id_len) = Identity::read_from(&p[13..]).expect("embedded identity");
    assert_eq!(&identity, host.rt.local.identity());

    let rest = &p[13 + id_len..];
    let (at_addr, at_len) = InetAddress::read_from(rest).expect("at address");
    assert_eq!(at_addr, at);

    let tail = &rest[at_len..];
    assert_eq!(u64::from_be_bytes(tail[..8].try_into().unwrap()), 0x1f2e3d4c);
    assert_eq!(
        u64::from_be_bytes(tail[8..16].try_into().unwrap()),
        1_700_000_000_000
    );
    assert_eq!(tail.len(), 16, "nothing after world id/timestamp");
}

#[test]
fn confirm_is_idempotent_and_monotone() {
    let host = Host::new(false);
    let peer = host.peer();
    let remote = v4(198, 51, 100, 7, 9993);

    host.node.set_now(1000);
    peer.received(&path_to(remote.clone()), 0, Verb::Ok, false);
    host.node.set_now(2000);
    peer.received(&path_to(remote.clone()), 0, Verb::Ok, false);

    assert_eq!(peer.num_paths(), 1);
    assert_eq!(peer.paths(2000)[0].last_receive, 2000);
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn send_direct_requires_liveness_unless_forced() {
    let host = Host::new(false);
    let peer = host.peer();

    host.node.set_now(1000);
    assert!(!peer.send_direct(b"x", 1000, true), "empty table sends nothing");

    let p = path_to(v4(198, 51, 100, 7, 9993));
    peer.received(&p, 0, Verb::Ok, false);

    // The path object itself has never seen a receive, so it is dead.
    assert!(!peer.has_active_direct_path(1000));
    assert!(!peer.send_direct(b"x", 1000, false));
    assert!(peer.send_direct(b"x", 1000, true), "forced send picks a slot");
    assert_eq!(host.node.sent_count(), 1);

    p.mark_received(1000);
    assert!(peer.has_active_direct_path(1000));
    assert!(peer.has_active_path_to(1000, &v4(198, 51, 100, 7, 9993)));
    assert!(!peer.has_active_path_to(1000, &v4(198, 51, 100, 8, 9993)));
    assert!(peer.send_direct(b"x", 1000, false));
}

#[test]
fn best_active_addresses_reports_per_family() {
    let host = Host::new(false);
    let peer = host.peer();

    let old_v4 = v4(198, 51, 100, 1, 9993);
    let new_v4 = v4(198, 51, 100, 2, 9993);
    let only_v6 = v6(9, 9993);

    host.node.set_now(1000);
    peer.received(&path_to(old_v4), 0, Verb::Ok, false);
    host.node.set_now(2000);
    peer.received(&path_to(only_v6.clone()), 0, Verb::Ok, false);
    host.node.set_now(3000);
    peer.received(&path_to(new_v4.clone()), 0, Verb::Ok, false);

    let (best_v4, best_v6) = peer.best_active_addresses(3000);
    assert_eq!(best_v4, Some(new_v4));
    assert_eq!(best_v6, Some(only_v6));

    let best = peer.best_path(3000).expect("non-empty table");
    assert_eq!(best.address().family(), Some(AddressFamily::V4));
}

// ============================================================================
// Liveness driver
// ============================================================================

#[test]
fn keepalive_before_ping_period_then_hello_after() {
    init_tracing();
    let host = Host::new(false);
    let peer = host.peer();
    let t0 = 1_000_000u64;

    host.node.set_now(t0);
    peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 0, Verb::Ok, false);

    // Silent for 30s: not long enough for a HELLO, but the send side has
    // been quiet, so the NAT binding gets a keepalive.
    let t1 = t0 + 30_000;
    assert!(peer.do_ping_and_keepalive(t1, None));
    let sent = host.node.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].2.len(), 4, "keepalive is a bare 4-byte payload");

    // Once the heartbeat period has elapsed again, another keepalive goes
    // out, and its payload differs from the first.
    assert!(peer.do_ping_and_keepalive(t1 + PATH_HEARTBEAT_PERIOD, None));
    let sent = host.node.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].2.len(), 4);
    assert_ne!(sent[0].2, sent[1].2, "keepalive bytes must not repeat");

    // A full ping period with no receive: HELLO.
    let t2 = t0 + PING_PERIOD;
    assert!(peer.do_ping_and_keepalive(t2, None));
    let hellos = host.sent_with_verb(Verb::Hello);
    assert_eq!(hellos.len(), 1);
}

#[test]
fn ping_respects_family_filter() {
    let host = Host::new(false);
    let peer = host.peer();
    let t0 = 1_000_000u64;

    host.node.set_now(t0);
    peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 0, Verb::Ok, false);

    assert!(!peer.do_ping_and_keepalive(t0 + PING_PERIOD, Some(AddressFamily::V6)));
    assert!(peer.do_ping_and_keepalive(t0 + PING_PERIOD, Some(AddressFamily::V4)));
    assert_eq!(host.sent_with_verb(Verb::Hello).len(), 1);
}

// ============================================================================
// Direct-path pusher
// ============================================================================

#[test]
fn push_is_rate_limited_and_dedupes_predictions() {
    init_tracing();
    let host = Host::new(false);
    let peer = host.peer();

    let direct_a = v4(203, 0, 113, 1, 9993);
    let direct_b = v6(1, 9993);
    *host.node.direct.lock().unwrap() = vec![direct_a.clone(), direct_b.clone()];
    *host.aware.predictions.lock().unwrap() = vec![
        v4(233, 252, 0, 1, 40000),
        v4(233, 252, 0, 1, 40001),
        v4(233, 252, 0, 1, 40000), // duplicate prediction
        direct_a.clone(),          // collides with a direct path
    ];

    // Relayed packet from a trusted peer triggers the push.
    let relay_path = path_to(v4(198, 51, 100, 200, 9993));
    let t0 = 1_000_000u64;
    host.node.set_now(t0);
    peer.received(&relay_path, 1, Verb::Frame, true);

    let pushes = host.sent_with_verb(Verb::PushDirectPaths);
    assert_eq!(pushes.len(), 1);
    let records = parse_push_records(&pushes[0]);
    let addrs: Vec<InetAddress> = records.iter().map(|(_, a)| a.clone()).collect();

    assert!(addrs.contains(&direct_a));
    assert!(addrs.contains(&direct_b));
    assert!(addrs.contains(&v4(233, 252, 0, 1, 40000)));
    assert!(addrs.contains(&v4(233, 252, 0, 1, 40001)));
    assert_eq!(addrs.len(), 4, "duplicates must be rejected");
    let unique: std::collections::HashSet<_> = addrs.iter().collect();
    assert_eq!(unique.len(), addrs.len());
    assert!(records.iter().all(|(flags, _)| *flags == 0));
    assert!(
        addrs.len() <= host.node.direct.lock().unwrap().len() + MAX_PER_SCOPE_AND_FAMILY,
        "prediction sampling is bounded"
    );

    // Within the interval: nothing further goes out.
    host.node.set_now(t0 + 30_000);
    peer.received(&relay_path, 1, Verb::Frame, true);
    assert_eq!(host.sent_with_verb(Verb::PushDirectPaths).len(), 1);

    // Past the interval: a fresh burst.
    host.node.set_now(t0 + DIRECT_PATH_PUSH_INTERVAL + 1);
    peer.received(&relay_path, 1, Verb::Frame, true);
    assert_eq!(host.sent_with_verb(Verb::PushDirectPaths).len(), 2);
}

#[test]
fn push_batches_stay_under_the_mtu_cap() {
    let host = Host::new(false);
    let peer = host.peer();

    // Enough v6 endpoints that one packet cannot carry them all.
    let many: Vec<InetAddress> = (0..120u8).map(|i| v6(i, 10_000 + i as u16)).collect();
    *host.node.direct.lock().unwrap() = many.clone();

    host.node.set_now(1_000_000);
    peer.received(&path_to(v4(198, 51, 100, 200, 9993)), 1, Verb::Frame, true);

    let raw: Vec<Vec<u8>> = host
        .node
        .sent()
        .into_iter()
        .map(|(_, _, bytes)| bytes)
        .collect();
    assert!(raw.len() > 1, "120 records cannot fit one sub-MTU packet");
    for frame in &raw {
        assert!(frame.len() <= PUSH_MTU, "armored push frame exceeds cap");
    }

    let mut all = Vec::new();
    for payload in host.sent_with_verb(Verb::PushDirectPaths) {
        all.extend(parse_push_records(&payload).into_iter().map(|(_, a)| a));
    }
    assert_eq!(all, many, "batching must preserve record order");
}

#[test]
fn untrusted_relayed_packets_do_not_push() {
    let host = Host::new(false);
    let peer = host.peer();
    *host.node.direct.lock().unwrap() = vec![v4(203, 0, 113, 1, 9993)];

    host.node.set_now(1_000_000);
    peer.received(&path_to(v4(198, 51, 100, 200, 9993)), 1, Verb::Frame, false);
    assert_eq!(host.node.sent_count(), 0);
}

#[test]
fn clustered_nodes_never_push_direct_paths() {
    let host = Host::new(true);
    let peer = host.peer();
    *host.node.direct.lock().unwrap() = vec![v4(203, 0, 113, 1, 9993)];

    host.node.set_now(1_000_000);
    peer.received(&path_to(v4(198, 51, 100, 200, 9993)), 1, Verb::Frame, true);
    assert_eq!(host.sent_with_verb(Verb::PushDirectPaths).len(), 0);
}

// ============================================================================
// Cluster redirection
// ============================================================================

#[test]
fn cluster_redirect_uses_push_for_modern_peers() {
    init_tracing();
    let host = Host::new(true);
    let cluster = host.cluster.as_ref().unwrap();
    let peer = host.peer();
    peer.set_remote_version(5, 1, 2, 0);

    // Learn the path first; OK is exempt from redirection.
    let p = path_to(v4(198, 51, 100, 7, 9993));
    host.node.set_now(1_000_000);
    peer.received(&p, 0, Verb::Ok, false);
    assert_eq!(host.node.sent_count(), 0);
    assert_eq!(
        *cluster.have_peer.lock().unwrap(),
        vec![peer.address()],
        "learning must be broadcast to the cluster"
    );

    // Now the cluster knows a better endpoint for this peer.
    let better = v4(203, 0, 113, 99, 9993);
    *cluster.better.lock().unwrap() = Some(better.clone());

    host.node.set_now(1_000_100);
    peer.received(&p, 0, Verb::Frame, false);

    let pushes = host.sent_with_verb(Verb::PushDirectPaths);
    assert_eq!(pushes.len(), 1);
    let records = parse_push_records(&pushes[0]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, PUSH_FLAG_CLUSTER_REDIRECT);
    assert_eq!(records[0].1, better);

    let snap = peer.paths(1_000_100);
    assert!(snap[0].cluster_suboptimal, "redirected slot must be marked");
}

#[test]
fn cluster_redirect_uses_rendezvous_for_legacy_peers() {
    let host = Host::new(true);
    let cluster = host.cluster.as_ref().unwrap();
    let peer = host.peer();
    peer.set_remote_version(4, 1, 0, 0);

    let better = v4(203, 0, 113, 99, 30000);
    *cluster.better.lock().unwrap() = Some(better.clone());

    host.node.set_now(1_000_000);
    peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 0, Verb::Frame, false);

    let rdv = host.sent_with_verb(Verb::Rendezvous);
    assert_eq!(rdv.len(), 1);
    let p = &rdv[0];
    assert_eq!(p[0], 0, "no flags");
    assert_eq!(&p[1..6], host.rt.local.address().as_bytes());
    assert_eq!(u16::from_be_bytes([p[6], p[7]]), 30000);
    assert_eq!(p[8], 4);
    assert_eq!(&p[9..13], &[203, 0, 113, 99]);
    assert_eq!(p.len(), 13);
}

#[test]
fn redirect_is_suppressed_for_protocol_state_verbs() {
    let host = Host::new(true);
    let cluster = host.cluster.as_ref().unwrap();
    let peer = host.peer();
    peer.set_remote_version(5, 1, 2, 0);
    *cluster.better.lock().unwrap() = Some(v4(203, 0, 113, 99, 9993));

    host.node.set_now(1_000_000);
    for verb in [Verb::Ok, Verb::Error, Verb::Rendezvous, Verb::PushDirectPaths] {
        peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 0, verb, false);
    }
    assert_eq!(
        host.sent_with_verb(Verb::PushDirectPaths).len(),
        0,
        "protocol-state verbs must not be preempted"
    );
    assert_eq!(host.sent_with_verb(Verb::Rendezvous).len(), 0);
}

#[test]
fn redirect_does_not_fire_for_relayed_packets() {
    let host = Host::new(true);
    let cluster = host.cluster.as_ref().unwrap();
    let peer = host.peer();
    peer.set_remote_version(5, 1, 2, 0);
    *cluster.better.lock().unwrap() = Some(v4(203, 0, 113, 99, 9993));

    host.node.set_now(1_000_000);
    peer.received(&path_to(v4(198, 51, 100, 7, 9993)), 3, Verb::Frame, false);
    assert_eq!(host.node.sent_count(), 0);
}

// ============================================================================
// Cleanup and reset
// ============================================================================

#[test]
fn clean_expires_silent_paths() {
    let host = Host::new(false);
    let peer = host.peer();

    host.node.set_now(1_000_000);
    peer.received(&path_to(v4(198, 51, 100, 1, 9993)), 0, Verb::Ok, false);
    host.node.set_now(1_500_000);
    peer.received(&path_to(v4(198, 51, 100, 2, 9993)), 0, Verb::Ok, false);

    peer.clean(1_000_000 + PATH_EXPIRATION + 1);
    let snap = peer.paths(1_500_000);
    assert_eq!(snap.len(), 1, "only the silent path expires");
    assert_eq!(snap[0].address, v4(198, 51, 100, 2, 9993));

    peer.clean(1_500_000 + PATH_EXPIRATION + 1);
    assert_eq!(peer.num_paths(), 0);
}

#[test]
fn reset_within_scope_drops_and_relearns() {
    init_tracing();
    let host = Host::new(false);
    let peer = host.peer();

    let private = v4(10, 1, 2, 3, 9993);
    let global = v4(198, 51, 100, 7, 9993);
    host.node.set_now(1_000_000);
    peer.received(&path_to(private.clone()), 0, Verb::Ok, false);
    peer.received(&path_to(global.clone()), 0, Verb::Ok, false);

    assert!(peer.reset_within_scope(IpScope::Private, 1_000_100));
    let snap = peer.paths(1_000_100);
    assert_eq!(snap.len(), 1, "only the in-scope path is dropped");
    assert_eq!(snap[0].address, global);

    // The dropped path got a parting HELLO toward its endpoint.
    let sent = host.node.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, private);
    assert_eq!(host.sent_with_verb(Verb::Hello).len(), 1);

    // Resetting a scope with no matching paths reports no shrinkage.
    assert!(!peer.reset_within_scope(IpScope::Private, 1_000_200));

    // An OK on the reset address re-learns it.
    host.node.set_now(1_000_300);
    peer.received(&path_to(private.clone()), 0, Verb::Ok, false);
    assert_eq!(peer.num_paths(), 2);
}

// ============================================================================
// Multicast announce cadence
// ============================================================================

#[test]
fn multicast_groups_are_reannounced_on_schedule() {
    let host = Host::new(false);
    let network = Arc::new(TestNetwork {
        announces: AtomicUsize::new(0),
    });
    host.node
        .networks
        .lock()
        .unwrap()
        .push(Arc::clone(&network) as Arc<dyn Network>);
    let peer = host.peer();
    let p = path_to(v4(198, 51, 100, 7, 9993));

    // First contact announces (the half-interval has long passed since 0).
    let t0 = 1_000_000u64;
    host.node.set_now(t0);
    peer.received(&p, 0, Verb::Ok, false);
    assert_eq!(network.announces.load(Ordering::SeqCst), 1);

    // Shortly after: no re-announce.
    host.node.set_now(t0 + 1000);
    peer.received(&p, 0, Verb::Frame, false);
    assert_eq!(network.announces.load(Ordering::SeqCst), 1);

    // At the half-expire mark: announced again.
    host.node.set_now(t0 + MULTICAST_LIKE_EXPIRE / 2);
    peer.received(&p, 0, Verb::Frame, false);
    assert_eq!(network.announces.load(Ordering::SeqCst), 2);
}
