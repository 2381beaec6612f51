//! # Per-Peer Path Management
//!
//! [`PeerPaths`] is the core of the overlay's reachability layer. For one
//! remote peer it maintains the bounded set of direct paths the peer has
//! been seen on, selects the best path for outbound traffic, keeps NAT
//! bindings alive, advertises new direct endpoints so two NATed peers can
//! meet, and — on clustered nodes — steers the peer toward the cluster
//! member best positioned to serve it.
//!
//! ## Path Table
//!
//! Up to [`MAX_PATHS`] slots guarded by one mutex. The receive handler
//! confirms known paths and learns new ones (a proven round trip — an `OK`
//! arriving on an unknown endpoint — installs it; anything else triggers a
//! probe). Scalar activity timestamps and the negotiated remote version are
//! plain atomics: writers store unlocked, readers tolerate stale values.
//!
//! ## Scoring
//!
//! `score = last_receive − latency − (ping period if cluster-suboptimal)`,
//! saturating. Receive recency dominates, measured latency breaks near
//! ties, and paths a cluster redirect marked suboptimal sink below anything
//! recently alive. Best-path selection compares with `>=` over slot order,
//! so ties go to the later slot; eviction scans for the worst slot with a
//! strict `<`, so there ties keep the earlier slot.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use tracing::{debug, trace};

use crate::identity::{Identity, SessionKey};
use crate::inet::{AddressFamily, InetAddress, IpScope};
use crate::packet::{Packet, Verb, ENCRYPTED_ARMOR_OVERHEAD};
use crate::path::Path;
use crate::runtime::Runtime;
use crate::{PROTO_VERSION, VERSION_MAJOR, VERSION_MINOR, VERSION_REVISION};

// ============================================================================
// Tunables
// ============================================================================

/// Maximum number of direct paths tracked per peer.
pub const MAX_PATHS: usize = 16;

/// Paths silent for longer than this are dropped by `clean`.
pub const PATH_EXPIRATION: u64 = 600_000;

/// A full HELLO is sent on the best path once it has been silent this long.
pub const PING_PERIOD: u64 = 60_000;

/// Minimum interval between outbound PUSH_DIRECT_PATHS bursts.
pub const DIRECT_PATH_PUSH_INTERVAL: u64 = 120_000;

/// Lifetime of a multicast group subscription on the remote side; group
/// memberships are re-announced at half this interval.
pub const MULTICAST_LIKE_EXPIRE: u64 = 600_000;

/// Maximum symmetric-NAT predictions added to one push burst.
pub const MAX_PER_SCOPE_AND_FAMILY: usize = 8;

/// On-wire size cap for one PUSH_DIRECT_PATHS packet (sub-MTU, so a burst
/// never fragments).
pub const PUSH_MTU: usize = 1200;

/// The peer counts as alive while anything has been received within this
/// window.
pub const PEER_ACTIVITY_TIMEOUT: u64 = 500_000;

/// Inbound PUSH_DIRECT_PATHS closer together than this increment the
/// cutoff counter.
pub const PUSH_DIRECT_PATHS_CUTOFF_TIME: u64 = 30_000;

/// Inbound pushes are ignored once the cutoff counter reaches this limit.
pub const PUSH_DIRECT_PATHS_CUTOFF_LIMIT: u32 = 5;

/// Bound on remembered remote-cluster-preferred v6 endpoints.
pub const MAX_REMOTE_CLUSTER_OPTIMAL_V6: usize = 4;

/// PUSH_DIRECT_PATHS record flag: this record is a cluster redirect, not an
/// ordinary endpoint advertisement.
pub const PUSH_FLAG_CLUSTER_REDIRECT: u8 = 0x02;

/// Peers at or above this protocol version understand PUSH_DIRECT_PATHS
/// and bare ECHO probes.
const MIN_MODERN_PROTO: u8 = 5;

/// Worst-case encoded size of one push record, with slack.
const MAX_PUSH_RECORD_LEN: usize = 24;

/// Pre-armor budget for one push packet: the armored frame must stay
/// within [`PUSH_MTU`].
const PUSH_PAYLOAD_BUDGET: usize = PUSH_MTU - ENCRYPTED_ARMOR_OVERHEAD;

/// Process-wide accumulator used to send varying values for NAT keepalive.
static NAT_KEEPALIVE: AtomicU32 = AtomicU32::new(0);

// ============================================================================
// Path table
// ============================================================================

/// One entry of the path table.
struct PathSlot {
    path: Arc<Path>,
    last_receive: u64,
    local_cluster_suboptimal: bool,
}

/// Read-only view of one path slot, for status surfaces and tests.
#[derive(Clone, Debug)]
pub struct PathSnapshot {
    pub address: InetAddress,
    pub local_address: InetAddress,
    pub last_receive: u64,
    pub alive: bool,
    pub cluster_suboptimal: bool,
}

/// Remote-cluster routing hints learned from the peer's own redirects.
#[derive(Default)]
struct ClusterHints {
    optimal_v4: Option<InetAddress>,
    optimal_v6: Vec<InetAddress>,
}

// ============================================================================
// PeerPaths
// ============================================================================

/// Path state for one remote peer.
pub struct PeerPaths {
    rt: Arc<Runtime>,
    identity: Identity,
    key: SessionKey,

    paths: Mutex<Vec<PathSlot>>,

    last_used: AtomicU64,
    last_receive: AtomicU64,
    last_unicast_frame: AtomicU64,
    last_multicast_frame: AtomicU64,
    last_announced_to: AtomicU64,
    last_direct_path_push_sent: AtomicU64,
    last_direct_path_push_receive: AtomicU64,

    latency: AtomicU32,
    direct_path_push_cutoff_count: AtomicU32,

    // (proto << 32) | (major << 24) | (minor << 16) | revision; 0 = unknown
    remote_version: AtomicU64,

    cluster_hints: Mutex<ClusterHints>,
}

impl PeerPaths {
    /// Create path state for a newly-contacted peer.
    ///
    /// Performs key agreement between the local identity and the peer's;
    /// a `PeerPaths` never exists without a session key.
    pub fn new(rt: Arc<Runtime>, peer_identity: Identity) -> anyhow::Result<Self> {
        let key = rt
            .local
            .agree(&peer_identity)
            .with_context(|| format!("key agreement with peer {} failed", peer_identity))?;
        Ok(Self {
            rt,
            identity: peer_identity,
            key,
            paths: Mutex::new(Vec::new()),
            last_used: AtomicU64::new(0),
            last_receive: AtomicU64::new(0),
            last_unicast_frame: AtomicU64::new(0),
            last_multicast_frame: AtomicU64::new(0),
            last_announced_to: AtomicU64::new(0),
            last_direct_path_push_sent: AtomicU64::new(0),
            last_direct_path_push_receive: AtomicU64::new(0),
            latency: AtomicU32::new(0),
            direct_path_push_cutoff_count: AtomicU32::new(0),
            remote_version: AtomicU64::new(0),
            cluster_hints: Mutex::new(ClusterHints::default()),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn address(&self) -> crate::identity::Address {
        self.identity.address()
    }

    /// The immutable symmetric key shared with this peer, needed by the
    /// host's receive pipeline to dearmor inbound packets.
    pub fn session_key(&self) -> &SessionKey {
        &self.key
    }

    fn table(&self) -> MutexGuard<'_, Vec<PathSlot>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------------

    fn score_slot(&self, slot: &PathSlot) -> u64 {
        let mut score = slot
            .last_receive
            .saturating_sub(u64::from(self.latency.load(Ordering::Relaxed)));
        if slot.local_cluster_suboptimal {
            score = score.saturating_sub(PING_PERIOD);
        }
        score
    }

    // ------------------------------------------------------------------------
    // Receive handler
    // ------------------------------------------------------------------------

    /// Consume one inbound authenticated packet from this peer.
    ///
    /// `path` is the path the packet physically arrived on, `hops` the
    /// number of overlay relays it traversed (0 = direct), and
    /// `trust_established` whether the peer shares a virtual network with
    /// us. Direct packets confirm or learn paths; relayed packets from
    /// trusted peers trigger a direct-path push.
    pub fn received(&self, path: &Arc<Path>, hops: u32, verb: Verb, trust_established: bool) {
        let now = self.rt.node.now();

        let mut cluster_suboptimal = false;
        if hops == 0 {
            if let Some(cluster) = self.rt.cluster.as_ref() {
                // Verbs carrying protocol state must not be preempted by a
                // redirect; everything else is fair game.
                let redirectable = !matches!(
                    verb,
                    Verb::Ok | Verb::Error | Verb::Rendezvous | Verb::PushDirectPaths
                );
                if redirectable {
                    if let Some(better) =
                        cluster.find_better_endpoint(self.identity.address(), path.address(), false)
                    {
                        if self.send_cluster_redirect(path, &better, now) {
                            cluster_suboptimal = true;
                        }
                    }
                }
            }
        }

        self.last_receive.store(now, Ordering::Relaxed);
        match verb {
            Verb::Frame | Verb::ExtFrame => {
                self.last_unicast_frame.store(now, Ordering::Relaxed)
            }
            Verb::MulticastFrame => self.last_multicast_frame.store(now, Ordering::Relaxed),
            _ => {}
        }

        if hops == 0 {
            let confirmed = {
                let mut table = self.table();
                let mut hit = false;
                for slot in table.iter_mut() {
                    if slot.path.address() == path.address() {
                        slot.last_receive = now;
                        slot.path = Arc::clone(path); // local bind may have rotated
                        slot.local_cluster_suboptimal = cluster_suboptimal;
                        hit = true;
                        break;
                    }
                }
                hit
            };

            if !confirmed
                && self
                    .rt
                    .node
                    .should_use_path_for_overlay(path.local_address(), path.address())
            {
                if verb == Verb::Ok {
                    // A proven round trip: install the path.
                    {
                        let mut table = self.table();
                        let slot = PathSlot {
                            path: Arc::clone(path),
                            last_receive: now,
                            local_cluster_suboptimal: cluster_suboptimal,
                        };
                        if table.len() < MAX_PATHS {
                            table.push(slot);
                        } else {
                            let idx = self.eviction_slot(&table, path.address().family());
                            table[idx] = slot;
                        }
                    }
                    debug!(
                        peer = %self.identity.address(),
                        path = %path.address(),
                        "learned new direct path"
                    );
                    if let Some(cluster) = self.rt.cluster.as_ref() {
                        cluster.broadcast_have_peer(self.identity.address());
                    }
                } else {
                    // Unconfirmed: elicit an OK with a probe. Modern peers
                    // get the smaller ECHO, ancient ones a full HELLO.
                    trace!(
                        peer = %self.identity.address(),
                        path = %path.address(),
                        verb = %verb,
                        "probing unknown path"
                    );
                    if self.remote_supports_echo() {
                        let mut outp = Packet::new(
                            self.identity.address(),
                            self.rt.local.address(),
                            Verb::Echo,
                        );
                        outp.armor(&self.key, true);
                        path.send(self.rt.node.as_ref(), outp.data(), now);
                    } else {
                        self.send_hello(path.local_address(), path.address(), now);
                    }
                }
            }
        } else if trust_established {
            self.push_direct_paths(path, now);
        }

        if now.saturating_sub(self.last_announced_to.load(Ordering::Relaxed))
            >= MULTICAST_LIKE_EXPIRE / 2 - 1000
        {
            self.last_announced_to.store(now, Ordering::Relaxed);
            for network in self.rt.node.all_networks() {
                network.try_announce_multicast_groups_to(self);
            }
        }
    }

    /// Pick the slot a new path of `family` replaces when the table is
    /// full: the lowest-scoring slot within the same address family, else
    /// the lowest-scoring slot of any family.
    fn eviction_slot(&self, table: &[PathSlot], family: Option<AddressFamily>) -> usize {
        let mut worst: Option<(usize, u64)> = None;
        for (i, slot) in table.iter().enumerate() {
            if slot.path.address().family() == family {
                let s = self.score_slot(slot);
                if worst.map_or(true, |(_, w)| s < w) {
                    worst = Some((i, s));
                }
            }
        }
        if let Some((idx, _)) = worst {
            return idx;
        }
        let mut idx = MAX_PATHS - 1;
        let mut w = u64::MAX;
        for (i, slot) in table.iter().enumerate() {
            let s = self.score_slot(slot);
            if s < w {
                w = s;
                idx = i;
            }
        }
        idx
    }

    /// Steer the peer toward `better`. Modern peers get a one-record
    /// PUSH_DIRECT_PATHS flagged as a cluster redirect; ancient peers get a
    /// RENDEZVOUS addressed to ourselves at the redirect endpoint.
    fn send_cluster_redirect(&self, path: &Arc<Path>, better: &InetAddress, now: u64) -> bool {
        let family = match better.family() {
            Some(f) => f,
            None => return false,
        };

        if self.remote_proto() >= MIN_MODERN_PROTO {
            let mut outp = Packet::new(
                self.identity.address(),
                self.rt.local.address(),
                Verb::PushDirectPaths,
            );
            outp.append_u16(1); // count
            outp.append_u8(PUSH_FLAG_CLUSTER_REDIRECT);
            outp.append_u16(0); // no extensions
            match family {
                AddressFamily::V4 => {
                    outp.append_u8(4);
                    outp.append_u8(6);
                }
                AddressFamily::V6 => {
                    outp.append_u8(6);
                    outp.append_u8(18);
                }
            }
            outp.append_bytes(better.ip_bytes());
            outp.append_u16(better.port());
            outp.armor(&self.key, true);
            path.send(self.rt.node.as_ref(), outp.data(), now);
        } else {
            let mut outp = Packet::new(
                self.identity.address(),
                self.rt.local.address(),
                Verb::Rendezvous,
            );
            outp.append_u8(0); // no flags
            outp.append_bytes(self.rt.local.address().as_bytes());
            outp.append_u16(better.port());
            match family {
                AddressFamily::V4 => outp.append_u8(4),
                AddressFamily::V6 => outp.append_u8(16),
            }
            outp.append_bytes(better.ip_bytes());
            outp.armor(&self.key, true);
            path.send(self.rt.node.as_ref(), outp.data(), now);
        }

        debug!(
            peer = %self.identity.address(),
            endpoint = %better,
            "redirecting peer to better cluster endpoint"
        );
        true
    }

    // ------------------------------------------------------------------------
    // Selectors
    // ------------------------------------------------------------------------

    /// Highest-scoring known path, dead or alive — the best candidate when
    /// anything at all is worth trying.
    pub fn best_path(&self, _now: u64) -> Option<Arc<Path>> {
        let table = self.table();
        let mut best: Option<usize> = None;
        let mut best_score = 0u64;
        for (i, slot) in table.iter().enumerate() {
            let s = self.score_slot(slot);
            if s >= best_score {
                best_score = s;
                best = Some(i);
            }
        }
        best.map(|i| Arc::clone(&table[i].path))
    }

    /// Send `data` on the highest-scoring alive path (or any path when
    /// `force_even_if_dead`). Returns whether a send was issued and
    /// accepted.
    pub fn send_direct(&self, data: &[u8], now: u64, force_even_if_dead: bool) -> bool {
        let table = self.table();
        let mut best: Option<usize> = None;
        let mut best_score = 0u64;
        for (i, slot) in table.iter().enumerate() {
            if force_even_if_dead || slot.path.alive(now) {
                let s = self.score_slot(slot);
                if s >= best_score {
                    best_score = s;
                    best = Some(i);
                }
            }
        }
        match best {
            Some(i) => table[i].path.send(self.rt.node.as_ref(), data, now),
            None => false,
        }
    }

    pub fn has_active_path_to(&self, now: u64, addr: &InetAddress) -> bool {
        self.table()
            .iter()
            .any(|slot| slot.path.address() == addr && slot.path.alive(now))
    }

    pub fn has_active_direct_path(&self, now: u64) -> bool {
        self.table().iter().any(|slot| slot.path.alive(now))
    }

    /// Per-family highest-scoring remote addresses. Liveness is not
    /// required: like `best_path`, this yields the best candidates to try.
    pub fn best_active_addresses(&self, _now: u64) -> (Option<InetAddress>, Option<InetAddress>) {
        let table = self.table();
        let mut best_v4: Option<usize> = None;
        let mut best_v6: Option<usize> = None;
        let mut score_v4 = 0u64;
        let mut score_v6 = 0u64;
        for (i, slot) in table.iter().enumerate() {
            match slot.path.address().family() {
                Some(AddressFamily::V4) => {
                    let s = self.score_slot(slot);
                    if s >= score_v4 {
                        score_v4 = s;
                        best_v4 = Some(i);
                    }
                }
                Some(AddressFamily::V6) => {
                    let s = self.score_slot(slot);
                    if s >= score_v6 {
                        score_v6 = s;
                        best_v6 = Some(i);
                    }
                }
                None => {}
            }
        }
        (
            best_v4.map(|i| table[i].path.address().clone()),
            best_v6.map(|i| table[i].path.address().clone()),
        )
    }

    // ------------------------------------------------------------------------
    // Liveness driver
    // ------------------------------------------------------------------------

    /// Send a full HELLO to `at_address`: protocol and software version,
    /// timestamp, our public identity, the address we see the peer at, and
    /// the world id/timestamp. HELLO is armored but sent in the clear.
    pub fn send_hello(&self, local: &InetAddress, at_address: &InetAddress, now: u64) {
        let mut outp = Packet::new(self.identity.address(), self.rt.local.address(), Verb::Hello);
        outp.append_u8(PROTO_VERSION);
        outp.append_u8(VERSION_MAJOR);
        outp.append_u8(VERSION_MINOR);
        outp.append_u16(VERSION_REVISION);
        outp.append_u64(now);
        outp.append_bytes(&self.rt.local.identity().to_wire());
        outp.append_bytes(&at_address.to_wire());
        outp.append_u64(self.rt.topology.world_id());
        outp.append_u64(self.rt.topology.world_timestamp());
        outp.armor(&self.key, false);
        self.rt.node.put_packet(local, at_address, outp.data());
    }

    /// Periodic tick for this peer: on the highest-scoring path of the
    /// requested family (`None` = any), send a HELLO once the path has been
    /// silent for [`PING_PERIOD`], or a small varying keepalive when the
    /// NAT binding is at risk. Returns whether any path was selected.
    pub fn do_ping_and_keepalive(&self, now: u64, family: Option<AddressFamily>) -> bool {
        let table = self.table();
        let mut best: Option<usize> = None;
        let mut best_score = 0u64;
        for (i, slot) in table.iter().enumerate() {
            if family.map_or(true, |f| slot.path.address().family() == Some(f)) {
                let s = self.score_slot(slot);
                if s >= best_score {
                    best_score = s;
                    best = Some(i);
                }
            }
        }
        match best {
            Some(i) => {
                let slot = &table[i];
                if now.saturating_sub(slot.last_receive) >= PING_PERIOD {
                    self.send_hello(slot.path.local_address(), slot.path.address(), now);
                } else if slot.path.needs_heartbeat(now) {
                    // Tumble the accumulator so keepalives carry constantly
                    // varying, meaningless payloads.
                    let mix = (now.wrapping_mul(0x9e37_79b1) >> 1) as u32;
                    let tumble = NAT_KEEPALIVE
                        .fetch_add(mix, Ordering::Relaxed)
                        .wrapping_add(mix);
                    slot.path
                        .send(self.rt.node.as_ref(), &tumble.to_be_bytes(), now);
                }
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Direct-path pusher
    // ------------------------------------------------------------------------

    /// Advertise our direct endpoints to the peer so both sides can try to
    /// meet directly. Rate-limited; disabled on clustered nodes where
    /// redirects supersede it. Returns whether a burst was emitted.
    fn push_direct_paths(&self, path: &Arc<Path>, now: u64) -> bool {
        if self.rt.clustered() {
            return false;
        }

        if now.saturating_sub(self.last_direct_path_push_sent.load(Ordering::Relaxed))
            < DIRECT_PATH_PUSH_INTERVAL
        {
            return false;
        }
        self.last_direct_path_push_sent.store(now, Ordering::Relaxed);

        let mut to_push = self.rt.node.direct_paths();

        let predictions = self.rt.self_awareness.symmetric_nat_predictions();
        if !predictions.is_empty() {
            // Sampling is with replacement; bound the draws so colliding
            // predictions cannot spin the loop.
            let mut added = 0usize;
            for _ in 0..predictions.len() * 2 {
                if added >= MAX_PER_SCOPE_AND_FAMILY {
                    break;
                }
                let pick =
                    predictions[(self.rt.node.prng() % predictions.len() as u64) as usize].clone();
                if !to_push.contains(&pick) {
                    to_push.push(pick);
                    added += 1;
                }
            }
        }

        if to_push.is_empty() {
            return false;
        }

        debug!(
            peer = %self.identity.address(),
            count = to_push.len(),
            "pushing direct paths"
        );

        let mut i = 0usize;
        while i < to_push.len() {
            let mut outp = Packet::new(
                self.identity.address(),
                self.rt.local.address(),
                Verb::PushDirectPaths,
            );
            let count_at = outp.len();
            outp.append_u16(0); // patched once the packet is packed

            let mut count: u16 = 0;
            while i < to_push.len() && outp.len() + MAX_PUSH_RECORD_LEN < PUSH_PAYLOAD_BUDGET {
                let addr = &to_push[i];
                i += 1;
                let (addr_type, entry_len) = match addr.family() {
                    Some(AddressFamily::V4) => (4u8, 6u8),
                    Some(AddressFamily::V6) => (6u8, 18u8),
                    None => continue, // only IP endpoints are pushable
                };
                outp.append_u8(0); // flags
                outp.append_u16(0); // no extensions
                outp.append_u8(addr_type);
                outp.append_u8(entry_len);
                outp.append_bytes(addr.ip_bytes());
                outp.append_u16(addr.port());
                count += 1;
            }

            if count > 0 {
                outp.set_u16(count_at, count);
                outp.armor(&self.key, true);
                path.send(self.rt.node.as_ref(), outp.data(), now);
            }
        }

        true
    }

    /// Rate gate for *inbound* PUSH_DIRECT_PATHS, called by the host's
    /// packet handler before acting on one. Receipts closer together than
    /// [`PUSH_DIRECT_PATHS_CUTOFF_TIME`] ratchet a counter; once it reaches
    /// [`PUSH_DIRECT_PATHS_CUTOFF_LIMIT`] further pushes are ignored until
    /// the peer backs off.
    pub fn should_accept_direct_path_push(&self, now: u64) -> bool {
        let last = self
            .last_direct_path_push_receive
            .swap(now, Ordering::Relaxed);
        if now.saturating_sub(last) <= PUSH_DIRECT_PATHS_CUTOFF_TIME {
            let count = self
                .direct_path_push_cutoff_count
                .fetch_add(1, Ordering::Relaxed)
                + 1;
            count < PUSH_DIRECT_PATHS_CUTOFF_LIMIT
        } else {
            self.direct_path_push_cutoff_count
                .store(0, Ordering::Relaxed);
            true
        }
    }

    // ------------------------------------------------------------------------
    // Cleanup and reset
    // ------------------------------------------------------------------------

    /// Drop paths that have been silent longer than [`PATH_EXPIRATION`],
    /// compacting the table and releasing the dropped path references.
    pub fn clean(&self, now: u64) {
        let mut table = self.table();
        table.retain(|slot| now.saturating_sub(slot.last_receive) <= PATH_EXPIRATION);
    }

    /// Forget every path whose remote address falls in `scope`, sending
    /// each a parting HELLO first — an OK(HELLO) re-learns the path if it
    /// still works. Returns whether the table shrank.
    pub fn reset_within_scope(&self, scope: IpScope, now: u64) -> bool {
        let mut table = self.table();
        let before = table.len();
        table.retain(|slot| {
            if slot.path.ip_scope() == scope {
                self.send_hello(slot.path.local_address(), slot.path.address(), now);
                false
            } else {
                true
            }
        });
        table.len() < before
    }

    // ------------------------------------------------------------------------
    // Activity, latency and version surface
    // ------------------------------------------------------------------------

    /// Record that outbound traffic was routed toward this peer.
    pub fn mark_used(&self, now: u64) {
        self.last_used.store(now, Ordering::Relaxed);
    }

    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    pub fn last_receive(&self) -> u64 {
        self.last_receive.load(Ordering::Relaxed)
    }

    pub fn last_unicast_frame(&self) -> u64 {
        self.last_unicast_frame.load(Ordering::Relaxed)
    }

    pub fn last_multicast_frame(&self) -> u64 {
        self.last_multicast_frame.load(Ordering::Relaxed)
    }

    pub fn is_alive(&self, now: u64) -> bool {
        now.saturating_sub(self.last_receive.load(Ordering::Relaxed)) < PEER_ACTIVITY_TIMEOUT
    }

    /// Record an RTT observation, clamped to 65535 ms.
    pub fn record_latency(&self, ms: u32) {
        self.latency.store(ms.min(0xffff), Ordering::Relaxed);
    }

    pub fn latency(&self) -> u32 {
        self.latency.load(Ordering::Relaxed)
    }

    /// Store the version tuple negotiated from a HELLO / OK(HELLO)
    /// exchange. Called by the host's packet handler.
    pub fn set_remote_version(&self, proto: u8, major: u8, minor: u8, revision: u16) {
        let packed = ((proto as u64) << 32)
            | ((major as u64) << 24)
            | ((minor as u64) << 16)
            | revision as u64;
        self.remote_version.store(packed, Ordering::Relaxed);
    }

    /// The negotiated `(proto, major, minor, revision)`, or `None` before
    /// any HELLO exchange.
    pub fn remote_version(&self) -> Option<(u8, u8, u8, u16)> {
        let packed = self.remote_version.load(Ordering::Relaxed);
        if packed == 0 {
            return None;
        }
        Some((
            (packed >> 32) as u8,
            (packed >> 24) as u8,
            (packed >> 16) as u8,
            packed as u16,
        ))
    }

    fn remote_proto(&self) -> u8 {
        (self.remote_version.load(Ordering::Relaxed) >> 32) as u8
    }

    /// Version gate for probes: modern peers accept a bare ECHO, ancient
    /// ones (or 1.1.0, whose ECHO handling was broken) need a full HELLO.
    pub fn remote_supports_echo(&self) -> bool {
        match self.remote_version() {
            Some((proto, major, minor, revision)) => {
                proto >= MIN_MODERN_PROTO && !(major == 1 && minor == 1 && revision == 0)
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Remote cluster hints
    // ------------------------------------------------------------------------

    /// Remember an endpoint the peer's cluster told us to prefer.
    pub fn set_remote_cluster_preferred(&self, addr: InetAddress) {
        let mut hints = self
            .cluster_hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match addr.family() {
            Some(AddressFamily::V4) => hints.optimal_v4 = Some(addr),
            Some(AddressFamily::V6) => {
                if !hints.optimal_v6.contains(&addr) {
                    if hints.optimal_v6.len() >= MAX_REMOTE_CLUSTER_OPTIMAL_V6 {
                        hints.optimal_v6.remove(0);
                    }
                    hints.optimal_v6.push(addr);
                }
            }
            None => {}
        }
    }

    /// The endpoint the peer's cluster prefers for `family`, if any.
    pub fn remote_cluster_preferred(&self, family: AddressFamily) -> Option<InetAddress> {
        let hints = self
            .cluster_hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match family {
            AddressFamily::V4 => hints.optimal_v4.clone(),
            AddressFamily::V6 => hints.optimal_v6.first().cloned(),
        }
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn num_paths(&self) -> usize {
        self.table().len()
    }

    /// Snapshot of the path table, in slot order.
    pub fn paths(&self, now: u64) -> Vec<PathSnapshot> {
        self.table()
            .iter()
            .map(|slot| PathSnapshot {
                address: slot.path.address().clone(),
                local_address: slot.path.local_address().clone(),
                last_receive: slot.last_receive,
                alive: slot.path.alive(now),
                cluster_suboptimal: slot.local_cluster_suboptimal,
            })
            .collect()
    }
}
