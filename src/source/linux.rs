// Linux-specific helpers: /proc/net/tcp{,6}, interface kind and operstate from /sys/class/net.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::models::InterfaceKind;

/// TCP state code for ESTABLISHED in /proc/net/tcp.
const TCP_ESTABLISHED: &str = "01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct TcpEntry {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl TcpEntry {
    pub(super) fn id(&self) -> String {
        format!("tcp:{}->{}", self.local, self.remote)
    }
}

/// Protocol label for a remote port (e.g. 443 -> "HTTPS").
pub(super) fn protocol_label(port: u16) -> &'static str {
    match port {
        443 | 8443 => "HTTPS",
        80 | 8080 => "HTTP",
        53 => "DNS",
        853 => "DoT",
        22 => "SSH",
        25 | 465 | 587 => "SMTP",
        993 => "IMAPS",
        _ => "TCP",
    }
}

/// Read established TCP connections to non-loopback peers (Linux). Empty elsewhere.
pub(super) fn read_tcp_connections() -> Vec<TcpEntry> {
    #[cfg(target_os = "linux")]
    {
        let mut out = Vec::new();
        for (path, v6) in [("/proc/net/tcp", false), ("/proc/net/tcp6", true)] {
            if let Ok(content) = std::fs::read_to_string(path) {
                out.extend(parse_proc_net_tcp(&content, v6));
            }
        }
        out
    }
    #[cfg(not(target_os = "linux"))]
    Vec::new()
}

/// Parse the table format of /proc/net/tcp or /proc/net/tcp6, keeping ESTABLISHED rows.
pub(super) fn parse_proc_net_tcp(content: &str, v6: bool) -> Vec<TcpEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _slot = cols.next()?;
            let local = parse_socket(cols.next()?, v6)?;
            let remote = parse_socket(cols.next()?, v6)?;
            let state = cols.next()?;
            if state != TCP_ESTABLISHED {
                return None;
            }
            if remote.ip().is_loopback() || remote.ip().is_unspecified() {
                return None;
            }
            Some(TcpEntry { local, remote })
        })
        .collect()
}

/// "0100007F:0050" -> 127.0.0.1:80. Address words are in host byte order; the port is not.
fn parse_socket(s: &str, v6: bool) -> Option<SocketAddr> {
    let (addr, port) = s.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let ip = if v6 {
        if addr.len() != 32 || !addr.is_ascii() {
            return None;
        }
        let mut octets = [0u8; 16];
        for (i, chunk) in octets.chunks_mut(4).enumerate() {
            let word = u32::from_str_radix(&addr[i * 8..i * 8 + 8], 16).ok()?;
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        let v6 = Ipv6Addr::from(octets);
        match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        }
    } else {
        if addr.len() != 8 {
            return None;
        }
        let word = u32::from_str_radix(addr, 16).ok()?;
        IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
    };
    Some(SocketAddr::new(ip, port))
}

/// Classify an interface by sysfs wireless marker, then by name prefix. `None` for
/// loopback and virtual interfaces (bridges, veth, tun).
pub(super) fn interface_kind(name: &str) -> Option<InterfaceKind> {
    #[cfg(target_os = "linux")]
    {
        if std::path::Path::new(&format!("/sys/class/net/{}/wireless", name)).exists() {
            return Some(InterfaceKind::WiFi);
        }
    }
    interface_kind_from_name(name)
}

fn interface_kind_from_name(name: &str) -> Option<InterfaceKind> {
    if name.starts_with("wl") || name.starts_with("wifi") {
        Some(InterfaceKind::WiFi)
    } else if name.starts_with("ww") || name.starts_with("rmnet") || name.starts_with("ccmni") {
        Some(InterfaceKind::Cellular)
    } else if name.starts_with("en") || name.starts_with("eth") || name.starts_with("em") {
        Some(InterfaceKind::Ethernet)
    } else {
        None
    }
}

/// Read /sys/class/net/<interface>/operstate (Linux). `None` when unavailable.
pub(super) fn is_interface_up(interface_name: &str) -> Option<bool> {
    #[cfg(target_os = "linux")]
    {
        let path = format!("/sys/class/net/{}/operstate", interface_name);
        if let Ok(content) = std::fs::read_to_string(&path) {
            return match content.trim() {
                "up" => Some(true),
                "down" | "lowerlayerdown" | "notpresent" => Some(false),
                _ => None,
            };
        }
    }
    None
}
