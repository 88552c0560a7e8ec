use std::collections::HashSet;
use std::io;
use std::net::Ipv4Addr;

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use tracing::warn;

/// Three-octet network prefix to sweep for `ip`.
///
/// If a local interface owns `ip`, the address is masked with that
/// interface's prefix length; otherwise the last octet is simply dropped.
pub fn network_base_for(ip: Ipv4Addr) -> [u8; 3] {
    let prefix_len = match get_if_addrs() {
        Ok(ifaces) => ifaces.into_iter().find_map(|iface| match iface.addr {
            IfAddr::V4(v4) if v4.ip == ip => Some(u32::from(v4.netmask).count_ones() as u8),
            _ => None,
        }),
        Err(e) => {
            warn!("failed to list local interfaces: {e}");
            None
        }
    };
    match prefix_len {
        Some(len) => masked_base(ip, len),
        None => {
            let o = ip.octets();
            [o[0], o[1], o[2]]
        }
    }
}

/// Mask `ip` with a prefix length and keep the first three octets.
pub fn masked_base(ip: Ipv4Addr, prefix_len: u8) -> [u8; 3] {
    let net = Ipv4Net::new(ip, prefix_len.min(32))
        .map(|n| n.network())
        .unwrap_or(ip);
    let o = net.octets();
    [o[0], o[1], o[2]]
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 network.
///
/// Duplicates are removed and the output is sorted.
pub fn detect_local_cidrs() -> io::Result<Vec<Ipv4Net>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs)
}

/// Convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24).expect("/24 is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cidr_from_ipv4() {
        let cidr = ipv4_to_default_cidr(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(cidr.to_string(), "10.1.2.0/24");
    }

    #[test]
    fn wider_prefix_masks_third_octet() {
        assert_eq!(masked_base(Ipv4Addr::new(172, 16, 5, 9), 16), [172, 16, 0]);
        assert_eq!(masked_base(Ipv4Addr::new(192, 168, 1, 9), 24), [192, 168, 1]);
    }

    #[test]
    fn unknown_address_falls_back_to_first_three_octets() {
        // TEST-NET-3 is never assigned to a local interface.
        assert_eq!(network_base_for(Ipv4Addr::new(203, 0, 113, 7)), [203, 0, 113]);
    }
}
