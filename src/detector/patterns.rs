// Deny-list patterns: exact host names, `*.domain` wildcards, IP addresses and CIDR ranges.
// Host names compare case-insensitively; address patterns only match IP-literal hosts.

use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum HostPattern {
    Exact(String),
    /// `*.example.com`: matches example.com and any subdomain of it.
    Domain(String),
    Address(IpAddr),
    /// `192.0.2.0/24`, `2001:db8::/32`; host bits of the address are ignored.
    Network(IpAddr, u8),
}

/// Parses a host as an IP literal, accepting `[v6]` brackets. IPv4-mapped v6 becomes v4.
pub(super) fn host_ip(host: &str) -> Option<IpAddr> {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let ip: IpAddr = host.parse().ok()?;
    Some(ip.to_canonical())
}

fn mask_bits(ip: IpAddr, prefix: u8) -> u128 {
    match ip {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0);
            (bits & mask) as u128
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = u128::MAX.checked_shl(128 - prefix as u32).unwrap_or(0);
            bits & mask
        }
    }
}

impl HostPattern {
    pub(super) fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_end_matches('.').to_ascii_lowercase();
        if let Some((addr, prefix)) = raw.split_once('/') {
            let ip: IpAddr = addr.parse().ok()?;
            let prefix: u8 = prefix.parse().ok()?;
            let max = if ip.is_ipv4() { 32 } else { 128 };
            if prefix > max {
                return None;
            }
            return Some(HostPattern::Network(ip, prefix));
        }
        if let Some(ip) = host_ip(&raw) {
            return Some(HostPattern::Address(ip));
        }
        match raw.strip_prefix("*.") {
            Some(domain) if !domain.is_empty() && !domain.contains('*') => {
                Some(HostPattern::Domain(domain.to_string()))
            }
            Some(_) => None,
            None if raw.is_empty() || raw.contains('*') => None,
            None => Some(HostPattern::Exact(raw)),
        }
    }

    pub(super) fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Address(addr) => host_ip(host) == Some(*addr),
            HostPattern::Network(net, prefix) => match host_ip(host) {
                Some(ip) if ip.is_ipv4() == net.is_ipv4() => {
                    mask_bits(ip, *prefix) == mask_bits(*net, *prefix)
                }
                _ => false,
            },
            HostPattern::Exact(name) => normalize(host) == *name,
            HostPattern::Domain(domain) => {
                let host = normalize(host);
                host == *domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}

fn normalize(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}
