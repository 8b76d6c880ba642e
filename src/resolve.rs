//! Destination resolution.

use std::net::{IpAddr, Ipv4Addr};

use dns_lookup::lookup_host;
use tracing::debug;

use crate::error::{TraceError, TraceResult};

/// Resolve `host` (a name or an address literal) to one IPv4 address.
pub fn resolve(host: &str) -> TraceResult<Ipv4Addr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return select_ipv4(host, &[ip]);
    }

    let addrs = lookup_host(host).map_err(|source| TraceError::Resolution {
        host: host.to_string(),
        source,
    })?;
    debug!(host, ?addrs, "Remote host has addresses");

    select_ipv4(host, &addrs)
}

/// Pick the first IPv4 address, counting IPv4-mapped IPv6 addresses as IPv4.
pub fn select_ipv4(host: &str, addrs: &[IpAddr]) -> TraceResult<Ipv4Addr> {
    addrs
        .iter()
        .find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        })
        .ok_or_else(|| TraceError::NoIpv4Address {
            host: host.to_string(),
        })
}
