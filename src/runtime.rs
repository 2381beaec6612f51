//! # Host Interfaces
//!
//! Trait definitions for everything the path manager consumes from its
//! host: the node environment (clock, packet sink, path policy, PRNG), the
//! self-awareness module (symmetric-NAT predictions), the topology layer
//! (world identifiers for HELLO), the optional cluster layer, and joined
//! virtual networks (multicast announce).
//!
//! [`Runtime`] bundles the host services with the local identity and is
//! handed to every [`PeerPaths`](crate::peer::PeerPaths) at construction.
//! Clustering is a runtime option, not a build flag: a `Runtime` without a
//! cluster behaves as a standalone node.

use std::sync::Arc;

use crate::identity::{Address, Keypair};
use crate::inet::InetAddress;
use crate::peer::PeerPaths;

/// The node environment: clock, socket output, policy and PRNG.
pub trait Node: Send + Sync {
    /// Current monotonic time in milliseconds.
    fn now(&self) -> u64;

    /// Emit raw bytes from `local` toward `remote`. Expected to be
    /// bounded-time (no blocking beyond the socket send buffer). Returns
    /// whether the packet was accepted for sending.
    fn put_packet(&self, local: &InetAddress, remote: &InetAddress, data: &[u8]) -> bool;

    /// All virtual networks this node has joined.
    fn all_networks(&self) -> Vec<Arc<dyn Network>>;

    /// The node's locally-bound direct addresses, as advertised to peers.
    fn direct_paths(&self) -> Vec<InetAddress>;

    /// Non-cryptographic randomness for sampling decisions.
    fn prng(&self) -> u64;

    /// Policy gate: may overlay traffic use the endpoint pair at all?
    fn should_use_path_for_overlay(&self, local: &InetAddress, remote: &InetAddress) -> bool;
}

/// Source of symmetric-NAT address predictions for the direct-path pusher.
pub trait SelfAwareness: Send + Sync {
    /// Guesses at the external `address:port` this host presents from
    /// behind a symmetric NAT. May contain duplicates.
    fn symmetric_nat_predictions(&self) -> Vec<InetAddress>;
}

/// Root-of-trust metadata exchanged inside HELLO.
pub trait Topology: Send + Sync {
    fn world_id(&self) -> u64;
    fn world_timestamp(&self) -> u64;
}

/// Federated-cluster services, present only on clustered nodes.
pub trait Cluster: Send + Sync {
    /// Is another cluster member better positioned to serve `peer` than
    /// this one, given where the peer currently reaches us?
    fn find_better_endpoint(
        &self,
        peer: Address,
        current_remote: &InetAddress,
        force: bool,
    ) -> Option<InetAddress>;

    /// Tell the rest of the cluster that this member holds a direct path
    /// to `peer`.
    fn broadcast_have_peer(&self, peer: Address);
}

/// A joined virtual network, as seen by the path manager.
pub trait Network: Send + Sync {
    /// Re-announce this network's multicast group memberships to `peer`.
    /// The peer reference is only valid for the duration of the call.
    fn try_announce_multicast_groups_to(&self, peer: &PeerPaths);
}

/// Host services plus local identity, shared by all peers of one node.
pub struct Runtime {
    pub node: Arc<dyn Node>,
    pub self_awareness: Arc<dyn SelfAwareness>,
    pub topology: Arc<dyn Topology>,
    pub cluster: Option<Arc<dyn Cluster>>,
    pub local: Keypair,
}

impl Runtime {
    pub fn clustered(&self) -> bool {
        self.cluster.is_some()
    }
}
