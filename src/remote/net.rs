//! Local/remote host detection

use std::collections::HashSet;
use std::net::{IpAddr, ToSocketAddrs};

/// Resolve a host name or address literal to its IP addresses
///
/// Address literals (including bracketed IPv6) are parsed without a DNS
/// lookup. Resolution failures yield an empty list.
pub fn resolve(host: &str) -> Vec<IpAddr> {
    let trimmed = host
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');

    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return vec![ip.to_canonical()];
    }

    match (trimmed, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs.map(|addr| addr.ip().to_canonical()).collect(),
        Err(e) => {
            tracing::debug!(host = %trimmed, error = %e, "Host did not resolve");
            Vec::new()
        }
    }
}

/// Addresses that belong to this machine
///
/// Loopback addresses of both families plus whatever this machine's own
/// hostname resolves to.
pub fn local_addresses() -> HashSet<IpAddr> {
    let mut addrs: HashSet<IpAddr> = ["127.0.0.1", "::1"]
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if let Some(name) = hostname() {
        addrs.extend(resolve(&name));
    }
    addrs
}

/// Whether `host` refers to this machine
///
/// Every address the host resolves to must be loopback, unspecified or one
/// of this machine's own addresses. IPv4-mapped IPv6 addresses compare equal
/// to their IPv4 form. Unresolvable hosts are treated as remote.
pub fn is_local(host: &str) -> bool {
    let resolved = resolve(host);
    if resolved.is_empty() {
        return false;
    }

    if resolved.iter().all(|ip| ip.is_loopback() || ip.is_unspecified()) {
        return true;
    }

    let local = local_addresses();
    resolved
        .iter()
        .all(|ip| ip.is_loopback() || ip.is_unspecified() || local.contains(ip))
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = vec![0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname NUL-terminates on success
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec())
        .ok()
        .filter(|name| !name.is_empty())
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
