//! # Network Paths
//!
//! A [`Path`] is one concrete way to reach a peer: a `(local bind, remote
//! endpoint)` pair with its own liveness bookkeeping. Paths are issued by
//! the host's socket layer and shared by `Arc` — several peers may hold the
//! same path, and a path lives as long as its longest holder.
//!
//! Liveness is receive-driven: a path is `alive` while packets keep
//! arriving on it. `needs_heartbeat` is send-driven: once nothing has been
//! sent for a while, the remote NAT binding is at risk of expiring and a
//! keepalive is due.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::inet::{InetAddress, IpScope};
use crate::runtime::Node;

/// A path is considered alive while the last receive is within this window.
pub const PATH_ALIVE_TIMEOUT: u64 = 45_000;

/// A path wants a NAT keepalive once nothing has been sent for this long.
pub const PATH_HEARTBEAT_PERIOD: u64 = 14_000;

/// One direct path to a peer: local bind address, remote endpoint and
/// activity timestamps.
pub struct Path {
    local: InetAddress,
    addr: InetAddress,
    last_send: AtomicU64,
    last_receive: AtomicU64,
}

impl Path {
    pub fn new(local: InetAddress, addr: InetAddress) -> Self {
        Self {
            local,
            addr,
            last_send: AtomicU64::new(0),
            last_receive: AtomicU64::new(0),
        }
    }

    /// Remote endpoint of this path.
    pub fn address(&self) -> &InetAddress {
        &self.addr
    }

    /// Local bind address of this path (may be nil for "any").
    pub fn local_address(&self) -> &InetAddress {
        &self.local
    }

    pub fn ip_scope(&self) -> IpScope {
        self.addr.ip_scope()
    }

    /// Record an inbound packet on this path. Called by the host's receive
    /// pipeline before the packet reaches any peer.
    pub fn mark_received(&self, now: u64) {
        self.last_receive.store(now, Ordering::Relaxed);
    }

    pub fn last_receive(&self) -> u64 {
        self.last_receive.load(Ordering::Relaxed)
    }

    pub fn last_send(&self) -> u64 {
        self.last_send.load(Ordering::Relaxed)
    }

    /// True while packets keep arriving on this path.
    pub fn alive(&self, now: u64) -> bool {
        now.saturating_sub(self.last_receive.load(Ordering::Relaxed)) < PATH_ALIVE_TIMEOUT
    }

    /// True once the send side has been quiet long enough that the remote
    /// NAT binding may be about to expire.
    pub fn needs_heartbeat(&self, now: u64) -> bool {
        now.saturating_sub(self.last_send.load(Ordering::Relaxed)) >= PATH_HEARTBEAT_PERIOD
    }

    /// Hand `data` to the host's packet sink for this path. Returns whether
    /// the sink accepted it; failures are traced and otherwise non-fatal.
    pub fn send(&self, node: &dyn Node, data: &[u8], now: u64) -> bool {
        if node.put_packet(&self.local, &self.addr, data) {
            self.last_send.store(now, Ordering::Relaxed);
            true
        } else {
            trace!(remote = %self.addr, len = data.len(), "packet sink rejected send");
            false
        }
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Path")
            .field("local", &self.local)
            .field("addr", &self.addr)
            .field("last_send", &self.last_send.load(Ordering::Relaxed))
            .field("last_receive", &self.last_receive.load(Ordering::Relaxed))
            .finish()
    }
}
