//! Boundary with the host shell: the outbound event queue, the callbacks it
//! feeds, and the server list the shell persists discovered servers into.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::progress::ProgressSnapshot;
use crate::types::DiscoveredServer;

/// Message from a running scan to the result sink.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Progress {
        scan_id: u64,
        snapshot: ProgressSnapshot,
    },
    ServerFound {
        scan_id: u64,
        server: DiscoveredServer,
    },
    /// Terminal; nothing else is sent for this scan afterwards.
    Complete {
        scan_id: u64,
        servers: Vec<DiscoveredServer>,
        cancelled: bool,
        aborted: Option<String>,
    },
}

impl ScanEvent {
    pub fn scan_id(&self) -> u64 {
        match self {
            ScanEvent::Progress { scan_id, .. }
            | ScanEvent::ServerFound { scan_id, .. }
            | ScanEvent::Complete { scan_id, .. } => *scan_id,
        }
    }
}

/// Callbacks of whatever consumes scan results, typically a UI.
///
/// Invoked only from [`ScanEvents`] dispatch, i.e. on the thread that drains
/// the queue, never from a probe worker.
pub trait ResultSink {
    fn on_progress(&mut self, percent: f32, processed: u64, total: u64);
    fn on_server_found(&mut self, server: DiscoveredServer);
    fn on_scan_complete(&mut self, servers: Vec<DiscoveredServer>, cancelled: bool);
}

/// Receiving end of the scanner's event queue.
#[derive(Debug)]
pub struct ScanEvents {
    rx: mpsc::UnboundedReceiver<ScanEvent>,
}

impl ScanEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ScanEvent>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ScanEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Hand every queued event to `sink` without waiting. Returns how many were delivered.
    ///
    /// Meant to be called from the owner's own tick, like a render loop.
    pub fn dispatch_pending<S: ResultSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut n = 0;
        while let Some(ev) = self.try_recv() {
            dispatch(ev, sink);
            n += 1;
        }
        n
    }

    /// Deliver events until a scan completes. Returns its `cancelled` flag,
    /// or `None` if the queue closed first.
    pub async fn dispatch_until_complete<S: ResultSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Option<bool> {
        while let Some(ev) = self.recv().await {
            if let Some(cancelled) = dispatch(ev, sink) {
                return Some(cancelled);
            }
        }
        None
    }
}

fn dispatch<S: ResultSink + ?Sized>(ev: ScanEvent, sink: &mut S) -> Option<bool> {
    match ev {
        ScanEvent::Progress { snapshot, .. } => {
            sink.on_progress(snapshot.percent, snapshot.processed, snapshot.total);
            None
        }
        ScanEvent::ServerFound { server, .. } => {
            sink.on_server_found(server);
            None
        }
        ScanEvent::Complete {
            servers, cancelled, ..
        } => {
            sink.on_scan_complete(servers, cancelled);
            Some(cancelled)
        }
    }
}

/// One row of the shell's persisted server list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub name: String,
    pub address: String,
}

impl DiscoveredServer {
    /// Give up the discovered server as a server-list entry.
    pub fn into_entry(self) -> ServerEntry {
        ServerEntry {
            name: self.label,
            address: self.address,
        }
    }
}

/// The shell's server list. The scanner never touches it; the shell appends
/// entries built from [`DiscoveredServer::into_entry`].
pub trait ServerListStore {
    type Error;

    fn load(&mut self) -> Result<Vec<ServerEntry>, Self::Error>;
    fn append(&mut self, entry: ServerEntry);
    fn save(&mut self) -> Result<(), Self::Error>;
}

/// A server list that lives in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryServerList {
    entries: Vec<ServerEntry>,
    saved: Vec<ServerEntry>,
}

impl MemoryServerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries as of the last `save`.
    pub fn saved(&self) -> &[ServerEntry] {
        &self.saved
    }
}

impl ServerListStore for MemoryServerList {
    type Error = std::convert::Infallible;

    fn load(&mut self) -> Result<Vec<ServerEntry>, Self::Error> {
        self.entries = self.saved.clone();
        Ok(self.entries.clone())
    }

    fn append(&mut self, entry: ServerEntry) {
        self.entries.push(entry);
    }

    fn save(&mut self) -> Result<(), Self::Error> {
        self.saved = self.entries.clone();
        Ok(())
    }
}
