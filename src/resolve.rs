//! Address resolution helpers. Resolution itself is a library call; the
//! reactor only decides which candidate to use. Literal IPv4/IPv6 strings
//! are detected up front so no lookup is attempted for them.

use crate::error::{NetError, Result};
use socket2::Domain;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

/// Classification of a host string as a literal address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpLiteral {
    /// Not a literal; needs resolution.
    None,
    V4,
    V6,
}

/// Classify a host string without performing any lookup.
pub fn ip_literal(host: &str) -> IpLiteral {
    if host.parse::<Ipv4Addr>().is_ok() {
        return IpLiteral::V4;
    }
    if host.parse::<Ipv6Addr>().is_ok() {
        return IpLiteral::V6;
    }
    IpLiteral::None
}

pub(crate) fn domain_of(addr: &SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

fn literal_addr(host: &str, port: u16) -> Option<SocketAddr> {
    host.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, port))
}

/// Resolve a bind address. An empty host binds to all interfaces.
pub(crate) fn resolve_bind(host: &str, port: u16) -> Result<SocketAddr> {
    if host.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Some(addr) = literal_addr(host, port) {
        return Ok(addr);
    }
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut it| it.next())
        .ok_or_else(|| NetError::AddressResolution(format!("{host}:{port}")))
}

/// Resolve a remote address, preferring candidates matching the hinted
/// address family (the family of an already-bound local socket). The hint
/// is soft: with no matching candidate the first one is used, and the
/// connect syscall reports the mismatch.
pub(crate) fn resolve_remote(host: &str, port: u16, family: Option<Domain>) -> Result<SocketAddr> {
    if let Some(addr) = literal_addr(host, port) {
        return Ok(addr);
    }
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .ok()
        .map(|it| it.collect())
        .unwrap_or_default();
    if candidates.is_empty() {
        return Err(NetError::AddressResolution(format!("{host}:{port}")));
    }
    let preferred = family.and_then(|fam| {
        candidates
            .iter()
            .find(|addr| domain_of(addr) == fam)
            .copied()
    });
    Ok(preferred.unwrap_or(candidates[0]))
}
