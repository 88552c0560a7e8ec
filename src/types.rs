use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// The atomic unit of work: one address and one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeTarget {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.addr, self.port))
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Result of probing one target. Exactly one per target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub target: ProbeTarget,
    pub reachable: bool,
    pub latency_ms: u64,
    pub error: Option<ProbeError>,
}

/// A reachable target, as handed to the result sink.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    /// Display label (`Server #42` for address sweeps, `ip:port` for port sweeps).
    pub label: String,
    /// `ip:port`, ready to be stored in a server list.
    pub address: String,
    pub latency_ms: u64,
    pub discovered_at: String,
}

/// Lifecycle of a single scan instance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl ScanPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanPhase::Completed | ScanPhase::Cancelled)
    }
}

/// Final results and counters of a scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanResults {
    pub scanned_total: u64,
    pub scanned_done: u64,
    pub found_count: u64,
    pub phase: ScanPhase,
    /// Set when the scan was cut short by a fatal resource problem.
    pub aborted: Option<String>,
    /// Discovery order.
    pub servers: Vec<DiscoveredServer>,
}
