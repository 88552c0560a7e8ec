#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use server_scan_rs::{
    DiscoveredServer, ProbeError, ProbeTarget, Prober, ResultSink, ScanEvent, ScanEvents,
};

#[derive(Debug, Clone, Copy)]
enum Reply {
    Accept(Duration),
    Exhausted,
    Panic,
}

/// A fake network: listed targets answer as configured, everything else
/// refuses after `closed_delay`.
#[derive(Debug, Default)]
pub struct MockNetwork {
    replies: HashMap<ProbeTarget, Reply>,
    closed_delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(self, addr: Ipv4Addr, port: u16) -> Self {
        self.open_after(addr, port, Duration::ZERO)
    }

    pub fn open_after(mut self, addr: Ipv4Addr, port: u16, delay: Duration) -> Self {
        self.replies
            .insert(ProbeTarget::new(addr, port), Reply::Accept(delay));
        self
    }

    /// This target fails as if the process ran out of sockets.
    pub fn exhausted_at(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.replies
            .insert(ProbeTarget::new(addr, port), Reply::Exhausted);
        self
    }

    /// This target panics inside the worker.
    pub fn panics_at(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.replies.insert(ProbeTarget::new(addr, port), Reply::Panic);
        self
    }

    pub fn closed_delay(mut self, delay: Duration) -> Self {
        self.closed_delay = delay;
        self
    }

    /// Probe call counter that stays readable after the mock moves into a scanner.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Prober for MockNetwork {
    async fn probe(&self, target: ProbeTarget) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(&target).copied() {
            Some(Reply::Accept(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(Reply::Exhausted) => Err(ProbeError::Exhausted),
            Some(Reply::Panic) => panic!("worker blew up on {target}"),
            None => {
                if !self.closed_delay.is_zero() {
                    tokio::time::sleep(self.closed_delay).await;
                }
                Err(ProbeError::Refused)
            }
        }
    }
}

/// Sink that remembers everything it was handed.
#[derive(Debug, Default)]
pub struct Recorder {
    pub progress: Vec<(f32, u64, u64)>,
    pub found: Vec<DiscoveredServer>,
    pub completions: Vec<(Vec<DiscoveredServer>, bool)>,
}

impl ResultSink for Recorder {
    fn on_progress(&mut self, percent: f32, processed: u64, total: u64) {
        self.progress.push((percent, processed, total));
    }

    fn on_server_found(&mut self, server: DiscoveredServer) {
        self.found.push(server);
    }

    fn on_scan_complete(&mut self, servers: Vec<DiscoveredServer>, cancelled: bool) {
        self.completions.push((servers, cancelled));
    }
}

/// Wait for the next `Complete` event, collecting everything before it.
pub async fn collect_until_complete(events: &mut ScanEvents) -> Vec<ScanEvent> {
    let mut out = Vec::new();
    while let Some(ev) = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("scan did not complete in time")
    {
        let done = matches!(ev, ScanEvent::Complete { .. });
        out.push(ev);
        if done {
            break;
        }
    }
    out
}

pub fn addresses(servers: &[DiscoveredServer]) -> Vec<String> {
    servers.iter().map(|s| s.address.clone()).collect()
}
