//! # Network Addresses and Scopes
//!
//! This module defines [`InetAddress`], the address type used throughout the
//! path manager: an IPv4 or IPv6 endpoint (address + port) with an explicit
//! nil state, plus the coarse [`IpScope`] classification that drives path
//! policy (which endpoints are worth advertising, which get reset together
//! when an interface changes).
//!
//! ## Wire Form
//!
//! `InetAddress` has a bit-exact serialization used inside HELLO payloads:
//!
//! | Tag | Body |
//! |-----|------|
//! | `0x00` | nothing (nil) |
//! | `0x04` | 4 address bytes + 2 port bytes |
//! | `0x06` | 16 address bytes + 2 port bytes |
//!
//! Ports are big-endian. Parsers return `Option` and never panic on short
//! or garbage input.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Address family of a non-nil [`InetAddress`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    V4,
    V6,
}

/// Coarse locality classification of an IP address.
///
/// Scope determines which endpoints may be advertised to peers and which
/// paths are torn down together by `reset_within_scope` when the local
/// network environment changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpScope {
    /// Nil or otherwise unclassifiable.
    None,
    /// 127.0.0.0/8, ::1
    Loopback,
    /// 169.254.0.0/16, fe80::/10
    LinkLocal,
    /// RFC 1918, fc00::/7
    Private,
    /// 100.64.0.0/10 (carrier-grade NAT)
    Shared,
    /// 224.0.0.0/4, ff00::/8
    Multicast,
    /// Everything else: publicly routable
    Global,
}

/// An IP endpoint (address + port) with an explicit nil state.
///
/// The nil state represents "no address" (e.g. an unspecified local bind)
/// and serializes to a single zero byte.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InetAddress {
    Nil,
    V4 { ip: [u8; 4], port: u16 },
    V6 { ip: [u8; 16], port: u16 },
}

impl InetAddress {
    /// Wire tag for a nil address.
    pub const TAG_NIL: u8 = 0x00;
    /// Wire tag for an IPv4 endpoint.
    pub const TAG_V4: u8 = 0x04;
    /// Wire tag for an IPv6 endpoint.
    pub const TAG_V6: u8 = 0x06;

    pub fn is_nil(&self) -> bool {
        matches!(self, InetAddress::Nil)
    }

    pub fn family(&self) -> Option<AddressFamily> {
        match self {
            InetAddress::Nil => None,
            InetAddress::V4 { .. } => Some(AddressFamily::V4),
            InetAddress::V6 { .. } => Some(AddressFamily::V6),
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            InetAddress::Nil => 0,
            InetAddress::V4 { port, .. } | InetAddress::V6 { port, .. } => *port,
        }
    }

    /// Raw address bytes: 4 for v4, 16 for v6, empty for nil.
    pub fn ip_bytes(&self) -> &[u8] {
        match self {
            InetAddress::Nil => &[],
            InetAddress::V4 { ip, .. } => ip,
            InetAddress::V6 { ip, .. } => ip,
        }
    }

    /// Classify the address into its locality scope.
    pub fn ip_scope(&self) -> IpScope {
        match self {
            InetAddress::Nil => IpScope::None,
            InetAddress::V4 { ip, .. } => {
                if ip[0] == 127 {
                    IpScope::Loopback
                } else if ip[0] == 169 && ip[1] == 254 {
                    IpScope::LinkLocal
                } else if ip[0] == 10
                    || (ip[0] == 172 && (ip[1] & 0xf0) == 16)
                    || (ip[0] == 192 && ip[1] == 168)
                {
                    IpScope::Private
                } else if ip[0] == 100 && (ip[1] & 0xc0) == 64 {
                    IpScope::Shared
                } else if (ip[0] & 0xf0) == 224 {
                    IpScope::Multicast
                } else if ip.iter().all(|b| *b == 0) {
                    IpScope::None
                } else {
                    IpScope::Global
                }
            }
            InetAddress::V6 { ip, .. } => {
                if ip[..15].iter().all(|b| *b == 0) {
                    match ip[15] {
                        0 => IpScope::None,
                        1 => IpScope::Loopback,
                        _ => IpScope::Global,
                    }
                } else if ip[0] == 0xfe && (ip[1] & 0xc0) == 0x80 {
                    IpScope::LinkLocal
                } else if (ip[0] & 0xfe) == 0xfc {
                    IpScope::Private
                } else if ip[0] == 0xff {
                    IpScope::Multicast
                } else {
                    IpScope::Global
                }
            }
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            InetAddress::Nil => None,
            InetAddress::V4 { ip, port } => {
                Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(*ip)), *port))
            }
            InetAddress::V6 { ip, port } => {
                Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(*ip)), *port))
            }
        }
    }

    /// Append the wire form to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            InetAddress::Nil => out.push(Self::TAG_NIL),
            InetAddress::V4 { ip, port } => {
                out.push(Self::TAG_V4);
                out.extend_from_slice(ip);
                out.extend_from_slice(&port.to_be_bytes());
            }
            InetAddress::V6 { ip, port } => {
                out.push(Self::TAG_V6);
                out.extend_from_slice(ip);
                out.extend_from_slice(&port.to_be_bytes());
            }
        }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(19);
        self.write_to(&mut out);
        out
    }

    /// Parse one wire-form address from the front of `data`.
    ///
    /// Returns the address and the number of bytes consumed, or `None` on
    /// short or unrecognized input.
    pub fn read_from(data: &[u8]) -> Option<(InetAddress, usize)> {
        match *data.first()? {
            Self::TAG_NIL => Some((InetAddress::Nil, 1)),
            Self::TAG_V4 if data.len() >= 7 => {
                let mut ip = [0u8; 4];
                ip.copy_from_slice(&data[1..5]);
                let port = u16::from_be_bytes([data[5], data[6]]);
                Some((InetAddress::V4 { ip, port }, 7))
            }
            Self::TAG_V6 if data.len() >= 19 => {
                let mut ip = [0u8; 16];
                ip.copy_from_slice(&data[1..17]);
                let port = u16::from_be_bytes([data[17], data[18]]);
                Some((InetAddress::V6 { ip, port }, 19))
            }
            _ => None,
        }
    }
}

impl From<SocketAddr> for InetAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(a) => InetAddress::V4 {
                ip: a.ip().octets(),
                port: a.port(),
            },
            SocketAddr::V6(a) => InetAddress::V6 {
                ip: a.ip().octets(),
                port: a.port(),
            },
        }
    }
}

impl fmt::Display for InetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_socket_addr() {
            Some(sa) => write!(f, "{}", sa),
            None => write!(f, "(nil)"),
        }
    }
}
