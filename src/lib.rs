//! Embeddable async TCP scanning engine for finding game servers on a LAN.
//!
//! A [`Scanner`] takes a [`ScanRequest`] (an address sweep on one port, or a
//! port sweep on one address), probes every target with a bounded pool of
//! TCP connects, and reports progress and discovered servers through a
//! [`ScanEvents`] queue that the host drains on its own schedule.
pub mod config;
pub mod error;
pub mod netdetect;
pub mod pool;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod sink;
pub mod targets;
pub mod types;

pub use config::ScanConfig;
pub use error::{ProbeError, ScanError, ValidationError};
pub use probe::{Prober, TcpProber};
pub use progress::ProgressSnapshot;
pub use scanner::{ScanHandle, Scanner};
pub use sink::{ResultSink, ScanEvent, ScanEvents, ServerEntry, ServerListStore};
pub use targets::{ScanMode, ScanRequest};
pub use types::{DiscoveredServer, ProbeOutcome, ProbeTarget, ScanPhase, ScanResults};
