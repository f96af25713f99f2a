//! Conversion between multiaddrs and raw socket addresses.
//!
//! A composite listen address names the rendezvous server first, then a
//! `/p2p-circuit` separator, then the local bind address:
//!
//! ```text
//! /ip4/1.2.3.4/tcp/9000/p2p-circuit/ip4/0.0.0.0/tcp/4001
//! └── rendezvous server ┘           └── local bind ───┘
//! ```
//!
//! Everything here is pure; no function performs network I/O.

use crate::RndzTransportError;

use multiaddr::{Multiaddr, Protocol};
use std::net::{IpAddr, SocketAddr};

/// Whether `addr` is exactly `/ip4|ip6/<ip>/tcp/<port>`.
///
/// This is the dial matcher: only addresses of this shape are routed to the
/// transport.
pub fn is_tcp_multiaddr(addr: &Multiaddr) -> bool {
    ip_tcp(addr).is_some()
}

/// Translate a TCP multiaddr into a socket address.
pub fn to_socket_addr(addr: &Multiaddr) -> Result<SocketAddr, RndzTransportError> {
    ip_tcp(addr).ok_or_else(|| RndzTransportError::AddressTranslation { addr: addr.clone() })
}

/// Inverse of [`to_socket_addr`].
pub fn from_socket_addr(addr: SocketAddr) -> Multiaddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) => Protocol::Ip4(ip),
        IpAddr::V6(ip) => Protocol::Ip6(ip),
    };
    Multiaddr::empty().with(ip).with(Protocol::Tcp(addr.port()))
}

/// Split a composite listen address into `(local bind, rendezvous server)`.
///
/// Both halves are required. An address naming only the server is rejected
/// rather than bound to an ephemeral local address.
pub fn split_listen_addr(addr: &Multiaddr) -> Result<(Multiaddr, Multiaddr), RndzTransportError> {
    let mut server = Multiaddr::empty();
    let mut local = Multiaddr::empty();
    let mut separators = 0usize;

    for proto in addr.iter() {
        match proto {
            Protocol::P2pCircuit => separators += 1,
            p if separators == 0 => server.push(p),
            p => local.push(p),
        }
    }

    let reason = match separators {
        0 => Some("missing p2p-circuit separator"),
        1 if server.is_empty() => Some("missing rendezvous server component"),
        1 if local.is_empty() => Some("missing local bind component"),
        1 => None,
        _ => Some("more than one p2p-circuit separator"),
    };
    if let Some(reason) = reason {
        return Err(RndzTransportError::InvalidListenAddress {
            addr: addr.clone(),
            reason,
        });
    }

    Ok((local, server))
}

/// Inverse of [`split_listen_addr`].
pub fn join_listen_addr(local: &Multiaddr, server: &Multiaddr) -> Multiaddr {
    let mut joined = server.clone().with(Protocol::P2pCircuit);
    for proto in local.iter() {
        joined.push(proto);
    }
    joined
}

/// Translate both halves of a listen address.
///
/// The rendezvous client binds the local half and registers with the server
/// from the same socket, so both must be of the same address family.
pub fn to_socket_pair(
    local: &Multiaddr,
    server: &Multiaddr,
) -> Result<(SocketAddr, SocketAddr), RndzTransportError> {
    let local = to_socket_addr(local)?;
    let server = to_socket_addr(server)?;
    if local.is_ipv4() != server.is_ipv4() {
        return Err(RndzTransportError::AddressFamilyMismatch { local, server });
    }
    Ok((local, server))
}

fn ip_tcp(addr: &Multiaddr) -> Option<SocketAddr> {
    let mut iter = addr.iter();
    let ip: IpAddr = match iter.next()? {
        Protocol::Ip4(ip) => ip.into(),
        Protocol::Ip6(ip) => ip.into(),
        _ => return None,
    };
    let port = match iter.next()? {
        Protocol::Tcp(port) => port,
        _ => return None,
    };
    if iter.next().is_some() {
        return None;
    }
    Some(SocketAddr::new(ip, port))
}
