use std::net::Ipv4Addr;

use crate::config::{
    DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, HOST_OCTET_END, HOST_OCTET_START,
};
use crate::error::ValidationError;
use crate::netdetect;
use crate::types::ProbeTarget;

/// What a scan sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Every host octet of `prefix.x` on one fixed port.
    AddressRange { prefix: [u8; 3], port: u16 },
    /// One address across an inclusive port span.
    PortRange { addr: Ipv4Addr, start: u16, end: u16 },
}

/// A validated, immutable scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    mode: ScanMode,
}

impl ScanRequest {
    /// Sweep host octets 1..=254 of `base` on `port`.
    ///
    /// `base` is either a full address (`192.168.1.7`, last octet ignored) or a
    /// three-octet prefix with a trailing dot (`10.0.0.`).
    pub fn address_range(base: &str, port: u32) -> Result<Self, ValidationError> {
        let addr = parse_base(base)?;
        let port = parse_port(port)?;
        let o = addr.octets();
        Ok(Self {
            mode: ScanMode::AddressRange {
                prefix: [o[0], o[1], o[2]],
                port,
            },
        })
    }

    /// Sweep `start..=end` on a single address.
    pub fn port_range(addr: &str, start: u32, end: u32) -> Result<Self, ValidationError> {
        let addr = parse_ipv4(addr)?;
        let start = parse_port(start)?;
        let end = parse_port(end)?;
        if start > end {
            return Err(ValidationError::InvalidRange { start, end });
        }
        Ok(Self {
            mode: ScanMode::PortRange { addr, start, end },
        })
    }

    /// Port sweep over the default span used for finding game servers.
    pub fn default_port_range(addr: &str) -> Result<Self, ValidationError> {
        Self::port_range(
            addr,
            DEFAULT_PORT_RANGE_START.into(),
            DEFAULT_PORT_RANGE_END.into(),
        )
    }

    /// Address sweep of the local network `ip` belongs to.
    ///
    /// The prefix is taken from the interface owning `ip` when there is one,
    /// otherwise the last octet of `ip` is dropped.
    pub fn local_sweep(ip: &str, port: u32) -> Result<Self, ValidationError> {
        let addr = parse_ipv4(ip)?;
        let port = parse_port(port)?;
        Ok(Self {
            mode: ScanMode::AddressRange {
                prefix: netdetect::network_base_for(addr),
                port,
            },
        })
    }

    /// Build from an already assembled mode, checking it the same way the
    /// string constructors do.
    pub fn from_mode(mode: ScanMode) -> Result<Self, ValidationError> {
        let req = Self { mode };
        req.validate()?;
        Ok(req)
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.mode {
            ScanMode::AddressRange { port, .. } => {
                parse_port(port.into())?;
            }
            ScanMode::PortRange { start, end, .. } => {
                parse_port(start.into())?;
                parse_port(end.into())?;
                if start > end {
                    return Err(ValidationError::InvalidRange { start, end });
                }
            }
        }
        Ok(())
    }

    /// Number of targets the request expands to.
    pub fn total(&self) -> u64 {
        self.targets().len() as u64
    }

    /// Lazily enumerate targets in ascending order.
    pub fn targets(&self) -> Targets {
        let (next, end) = match self.mode {
            ScanMode::AddressRange { .. } => {
                (u32::from(HOST_OCTET_START), u32::from(HOST_OCTET_END))
            }
            ScanMode::PortRange { start, end, .. } => (u32::from(start), u32::from(end)),
        };
        Targets {
            mode: self.mode,
            next,
            end,
        }
    }

    /// Display label for a reachable target.
    pub fn label_for(&self, target: &ProbeTarget) -> String {
        match self.mode {
            ScanMode::AddressRange { .. } => format!("Server #{}", target.addr.octets()[3]),
            ScanMode::PortRange { .. } => target.to_string(),
        }
    }
}

/// Ascending, finite target sequence. Clone it to restart.
#[derive(Debug, Clone)]
pub struct Targets {
    mode: ScanMode,
    next: u32,
    end: u32,
}

impl Iterator for Targets {
    type Item = ProbeTarget;

    fn next(&mut self) -> Option<ProbeTarget> {
        if self.next > self.end {
            return None;
        }
        let n = self.next;
        self.next += 1;
        Some(match self.mode {
            ScanMode::AddressRange { prefix, port } => {
                ProbeTarget::new(Ipv4Addr::new(prefix[0], prefix[1], prefix[2], n as u8), port)
            }
            ScanMode::PortRange { addr, .. } => ProbeTarget::new(addr, n as u16),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.end + 1).saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Targets {}

/// Parse a strict dotted-quad IPv4 address.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ValidationError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| ValidationError::InvalidAddress(s.to_string()))
}

/// Validate a TCP port (1..=65535).
pub fn parse_port(val: u32) -> Result<u16, ValidationError> {
    if val == 0 || val > 65535 {
        return Err(ValidationError::InvalidPort(val));
    }
    Ok(val as u16)
}

fn parse_base(s: &str) -> Result<Ipv4Addr, ValidationError> {
    let trimmed = s.trim();
    if trimmed.ends_with('.') && trimmed.matches('.').count() == 3 {
        return parse_ipv4(&format!("{trimmed}0"))
            .map_err(|_| ValidationError::InvalidAddress(s.to_string()));
    }
    parse_ipv4(trimmed).map_err(|_| ValidationError::InvalidAddress(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_range_covers_host_octets() {
        let req = ScanRequest::address_range("10.0.0.", 25565).unwrap();
        let targets: Vec<_> = req.targets().collect();
        assert_eq!(targets.len(), 254);
        assert_eq!(targets[0], ProbeTarget::new(Ipv4Addr::new(10, 0, 0, 1), 25565));
        assert_eq!(targets[253], ProbeTarget::new(Ipv4Addr::new(10, 0, 0, 254), 25565));
    }

    #[test]
    fn full_address_base_drops_last_octet() {
        let a = ScanRequest::address_range("192.168.1.77", 25565).unwrap();
        let b = ScanRequest::address_range("192.168.1.", 25565).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_port_range_has_one_target() {
        let req = ScanRequest::port_range("127.0.0.1", 8080, 8080).unwrap();
        let targets: Vec<_> = req.targets().collect();
        assert_eq!(targets, vec![ProbeTarget::new(Ipv4Addr::LOCALHOST, 8080)]);
    }

    #[test]
    fn full_port_span_without_overflow() {
        let req = ScanRequest::port_range("127.0.0.1", 1, 65535).unwrap();
        assert_eq!(req.total(), 65535);
        assert_eq!(req.targets().count(), 65535);
        assert_eq!(req.targets().last().map(|t| t.port), Some(65535));
    }

    #[test]
    fn targets_restart_from_a_clone() {
        let req = ScanRequest::port_range("127.0.0.1", 10, 12).unwrap();
        let mut it = req.targets();
        let snapshot = it.clone();
        it.next();
        assert_eq!(it.len(), 2);
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn default_port_range_spans_to_the_top() {
        let req = ScanRequest::default_port_range("192.168.1.20").unwrap();
        let mut targets = req.targets();
        assert_eq!(targets.len(), 65535 - 25565 + 1);
        assert_eq!(targets.next().map(|t| t.port), Some(DEFAULT_PORT_RANGE_START));
        assert_eq!(targets.last().map(|t| t.port), Some(DEFAULT_PORT_RANGE_END));
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(matches!(
            ScanRequest::port_range("999.1.1.1", 1, 2),
            Err(ValidationError::InvalidAddress(_))
        ));
        assert_eq!(
            ScanRequest::port_range("10.0.0.1", 20, 10),
            Err(ValidationError::InvalidRange { start: 20, end: 10 })
        );
        assert_eq!(
            ScanRequest::port_range("10.0.0.1", 1, 70000),
            Err(ValidationError::InvalidPort(70000))
        );
        assert!(ScanRequest::address_range("10.0.", 25565).is_err());
        assert!(ScanRequest::address_range("", 25565).is_err());
        assert_eq!(
            ScanRequest::address_range("10.0.0.", 0),
            Err(ValidationError::InvalidPort(0))
        );
    }

    #[test]
    fn from_mode_validates() {
        let bad = ScanMode::PortRange {
            addr: Ipv4Addr::LOCALHOST,
            start: 0,
            end: 10,
        };
        assert_eq!(ScanRequest::from_mode(bad), Err(ValidationError::InvalidPort(0)));
    }

    #[test]
    fn labels_follow_mode() {
        let sweep = ScanRequest::address_range("10.0.0.", 25565).unwrap();
        let t = ProbeTarget::new(Ipv4Addr::new(10, 0, 0, 42), 25565);
        assert_eq!(sweep.label_for(&t), "Server #42");

        let ports = ScanRequest::port_range("10.0.0.42", 1, 10).unwrap();
        assert_eq!(ports.label_for(&t), "10.0.0.42:25565");
    }
}
