//! # Weft - Per-Peer Path Management for a Virtual Network Overlay
//!
//! Weft implements the reachability core of a peer-to-peer virtual-network
//! overlay: for each remote peer it tracks the small set of network paths
//! the peer is reachable through, selects the best one for outbound
//! traffic, keeps NAT bindings alive, advertises direct endpoints so two
//! NATed peers can meet, and steers peers between members of a federated
//! cluster.
//!
//! ## Architecture
//!
//! The host node owns sockets, the peer table and the cryptographic packet
//! pipeline; weft owns per-peer path state. The host feeds every inbound
//! authenticated packet into [`PeerPaths::received`](peer::PeerPaths::received),
//! consults the selectors for outbound traffic, and ticks
//! `clean` / `do_ping_and_keepalive` from a periodic timer thread. All host
//! services are consumed through the traits in [`runtime`].
//!
//! The core is synchronous and thread-safe: one mutex guards each peer's
//! path table, everything else is atomics.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `identity` | Keypairs, identities, 40-bit addresses, key agreement |
//! | `inet` | IP endpoints, scope classification, wire form |
//! | `packet` | Verbs, packet framing, armor (MAC + optional AEAD) |
//! | `path` | A single `(local bind, remote endpoint)` path |
//! | `runtime` | Host interfaces (node, self-awareness, topology, cluster) |
//! | `peer` | `PeerPaths`: the per-peer path manager |

mod identity;
mod inet;
mod packet;
mod path;
mod peer;
mod runtime;

pub use identity::{
    Address, AgreementError, Identity, IdentityError, Keypair, SessionKey, ADDRESS_LEN,
    IDENTITY_WIRE_LEN, SESSION_KEY_LEN,
};
pub use inet::{AddressFamily, InetAddress, IpScope};
pub use packet::{
    Packet, PacketError, Verb, ENCRYPTED_ARMOR_OVERHEAD, MAC_LEN, NONCE_LEN, PACKET_IDX_PAYLOAD,
    VERB_FLAG_ENCRYPTED, VERB_MASK,
};
pub use path::{Path, PATH_ALIVE_TIMEOUT, PATH_HEARTBEAT_PERIOD};
pub use peer::{
    PathSnapshot, PeerPaths, DIRECT_PATH_PUSH_INTERVAL, MAX_PATHS, MAX_PER_SCOPE_AND_FAMILY,
    MAX_REMOTE_CLUSTER_OPTIMAL_V6, MULTICAST_LIKE_EXPIRE, PATH_EXPIRATION, PEER_ACTIVITY_TIMEOUT,
    PING_PERIOD, PUSH_DIRECT_PATHS_CUTOFF_LIMIT, PUSH_DIRECT_PATHS_CUTOFF_TIME,
    PUSH_FLAG_CLUSTER_REDIRECT, PUSH_MTU,
};
pub use runtime::{Cluster, Network, Node, Runtime, SelfAwareness, Topology};

/// Overlay protocol version spoken by this implementation.
pub const PROTO_VERSION: u8 = 5;

/// Software version advertised in HELLO.
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 1;
pub const VERSION_REVISION: u16 = 0;
