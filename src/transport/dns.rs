//! DNS lookup primitive

use crate::error::ShroudError;
use std::net::{IpAddr, Ipv4Addr};

/// Resolve `host` to a single IP address
///
/// Literal addresses are returned without a lookup.
pub async fn lookup(host: &str) -> Result<IpAddr, ShroudError> {
    if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ShroudError::DnsResolution(format!("{}: {}", host, e)))?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ShroudError::DnsResolution(format!("{}: no addresses found", host)))
}

/// Resolve `host` to an IPv4 address, for proxies that cannot carry IPv6
pub async fn lookup_v4(host: &str) -> Result<Ipv4Addr, ShroudError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(ip) => Ok(ip),
            IpAddr::V6(_) => Err(ShroudError::DnsResolution(format!(
                "{}: IPv6 address where IPv4 is required",
                host
            ))),
        };
    }

    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ShroudError::DnsResolution(format!("{}: {}", host, e)))?;

    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| ShroudError::DnsResolution(format!("{}: no IPv4 addresses found", host)))
}
