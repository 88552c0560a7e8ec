use std::time::Duration;

use serde::Deserialize;

use crate::targets::ScanMode;

/// Default port a game server listens on; also the fixed port of an address sweep.
pub const DEFAULT_SERVER_PORT: u16 = 25565;
/// First host octet probed in address-range mode.
pub const HOST_OCTET_START: u8 = 1;
/// Last host octet probed in address-range mode.
pub const HOST_OCTET_END: u8 = 254;
/// Default port span for a single-host sweep.
pub const DEFAULT_PORT_RANGE_START: u16 = 25565;
pub const DEFAULT_PORT_RANGE_END: u16 = 65535;

/// Connect timeout of an address sweep; remote hosts may answer slowly.
pub const ADDRESS_SWEEP_TIMEOUT: Duration = Duration::from_millis(200);
/// Connect timeout of a port sweep against one already-known host.
pub const PORT_SWEEP_TIMEOUT: Duration = Duration::from_millis(100);

const MAX_CONCURRENCY: usize = 5_000;

/// Tunables for one scanner instance.
///
/// Deserializable so a host shell can keep it next to its own settings:
///
/// ```
/// use server_scan_rs::config::ScanConfig;
/// let cfg = ScanConfig::from_json_str(r#"{ "concurrency": 25, "timeout_ms": 100 }"#).unwrap();
/// assert_eq!(cfg.concurrency, 25);
/// assert_eq!(cfg.port_sweep_timeout.as_millis(), 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Max concurrent TCP connect attempts.
    pub concurrency: usize,
    /// Per-probe connect timeout of address sweeps.
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    /// Per-probe connect timeout of port sweeps.
    #[serde(rename = "port_sweep_timeout_ms", with = "millis")]
    pub port_sweep_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            timeout: ADDRESS_SWEEP_TIMEOUT,
            port_sweep_timeout: PORT_SWEEP_TIMEOUT,
        }
    }
}

impl ScanConfig {
    /// Same timeout for both sweep kinds.
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency,
            timeout,
            port_sweep_timeout: timeout,
        }
    }

    /// A `timeout_ms` without `port_sweep_timeout_ms` applies to both sweeps.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(s)?;
        let inherit = value.get("timeout_ms").is_some()
            && value.get("port_sweep_timeout_ms").is_none();
        let mut cfg: Self = serde_json::from_value(value)?;
        if inherit {
            cfg.port_sweep_timeout = cfg.timeout;
        }
        Ok(cfg)
    }

    /// Connect timeout for probes of a scan in `mode`.
    pub fn timeout_for(&self, mode: &ScanMode) -> Duration {
        match mode {
            ScanMode::AddressRange { .. } => self.timeout,
            ScanMode::PortRange { .. } => self.port_sweep_timeout,
        }
    }

    /// Concurrency clamped to what the pool accepts.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
