use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::{ProbeError, ScanError};
use crate::pool::{run_pool, PoolExit};
use crate::probe::{Prober, TcpProber};
use crate::progress::{Progress, ProgressSnapshot};
use crate::sink::{ScanEvent, ScanEvents};
use crate::targets::ScanRequest;
use crate::types::{DiscoveredServer, ProbeOutcome, ScanPhase, ScanResults};

/// Owns the probe pool and runs at most one scan at a time.
///
/// Every scan gets its own state; events of all scans go to the single
/// [`ScanEvents`] queue returned by [`Scanner::new`], tagged with the scan id.
pub struct Scanner {
    config: ScanConfig,
    prober: Arc<dyn Prober>,
    events: mpsc::UnboundedSender<ScanEvent>,
    current: Mutex<Option<Arc<ScanState>>>,
    next_id: AtomicU64,
}

impl Scanner {
    /// Scanner probing the real network with TCP connects.
    pub fn new(config: ScanConfig) -> (Self, ScanEvents) {
        Self::with_prober(config, TcpProber)
    }

    pub fn with_prober<P: Prober>(config: ScanConfig, prober: P) -> (Self, ScanEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scanner = Self {
            config,
            prober: Arc::new(prober),
            events: tx,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        };
        (scanner, ScanEvents::new(rx))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Validate `request` and start scanning it in the background.
    ///
    /// Must be called from within a tokio runtime. Without one the scan is
    /// reported as aborted through the event queue instead of running.
    pub fn start(&self, request: ScanRequest) -> Result<ScanHandle, ScanError> {
        request.validate()?;

        let mut current = lock(&self.current);
        if let Some(active) = current.as_ref() {
            if active.phase() == ScanPhase::Running {
                return Err(ScanError::AlreadyScanning);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(ScanState::new(id, request, self.events.clone()));
        *current = Some(state.clone());
        drop(current);

        info!(
            scan = id,
            mode = ?request.mode(),
            total = request.total(),
            concurrency = self.config.effective_concurrency(),
            "scan started"
        );

        match Handle::try_current() {
            Ok(rt) => {
                rt.spawn(drive(state.clone(), self.prober.clone(), self.config.clone()));
            }
            Err(e) => {
                warn!(scan = id, "cannot start probe pool: {e}");
                state.abort(format!("no async runtime to run the probe pool: {e}"));
            }
        }
        Ok(ScanHandle { state })
    }

    /// Cancel the active scan, if any. Idempotent.
    pub fn cancel(&self) {
        if let Some(state) = lock(&self.current).as_ref() {
            state.cancel();
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.phase() == ScanPhase::Running
    }

    /// Phase of the most recent scan, `Idle` before the first one.
    pub fn phase(&self) -> ScanPhase {
        lock(&self.current)
            .as_ref()
            .map(|s| s.phase())
            .unwrap_or_default()
    }

    /// Handle to the most recent scan.
    pub fn current(&self) -> Option<ScanHandle> {
        lock(&self.current)
            .as_ref()
            .map(|state| ScanHandle {
                state: state.clone(),
            })
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Caller-side handle to one scan.
#[derive(Clone)]
pub struct ScanHandle {
    state: Arc<ScanState>,
}

impl ScanHandle {
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn request(&self) -> &ScanRequest {
        &self.state.request
    }

    pub fn phase(&self) -> ScanPhase {
        self.state.phase()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.state.progress.snapshot()
    }

    /// Servers found so far, in discovery order.
    pub fn discovered(&self) -> Vec<DiscoveredServer> {
        lock(&self.state.inner).servers.clone()
    }

    /// Remove a discovered server, handing it to the caller.
    pub fn take_discovered(&self, address: &str) -> Option<DiscoveredServer> {
        let mut inner = lock(&self.state.inner);
        let idx = inner.servers.iter().position(|s| s.address == address)?;
        Some(inner.servers.remove(idx))
    }

    /// Fire-and-forget cancellation. Calling it again, or after the scan
    /// finished, has no effect.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Wait until the scan reaches a terminal phase.
    pub async fn finished(&self) -> ScanPhase {
        let mut rx = self.state.done.subscribe();
        let phase = match rx.wait_for(|p| p.is_terminal()).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        };
        phase
    }

    pub fn results(&self) -> ScanResults {
        let inner = lock(&self.state.inner);
        let snap = self.state.progress.snapshot();
        ScanResults {
            scanned_total: snap.total,
            scanned_done: snap.processed,
            found_count: snap.found,
            phase: inner.phase,
            aborted: inner.aborted.clone(),
            servers: inner.servers.clone(),
        }
    }
}

/// State of one scan instance, shared by the coordinator and every worker.
struct ScanState {
    id: u64,
    request: ScanRequest,
    progress: Progress,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ScanEvent>,
    done: watch::Sender<ScanPhase>,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    phase: ScanPhase,
    servers: Vec<DiscoveredServer>,
    aborted: Option<String>,
}

impl ScanState {
    fn new(id: u64, request: ScanRequest, events: mpsc::UnboundedSender<ScanEvent>) -> Self {
        let (done, _) = watch::channel(ScanPhase::Running);
        Self {
            id,
            request,
            progress: Progress::new(request.total()),
            cancel: CancellationToken::new(),
            events,
            done,
            inner: Mutex::new(Inner {
                phase: ScanPhase::Running,
                servers: Vec::new(),
                aborted: None,
            }),
        }
    }

    fn phase(&self) -> ScanPhase {
        lock(&self.inner).phase
    }

    /// Merge one probe result. Results arriving after the scan ended are dropped.
    fn on_outcome(&self, outcome: ProbeOutcome) {
        if outcome.error == Some(ProbeError::Exhausted) {
            warn!(
                scan = self.id,
                target = %outcome.target,
                "socket budget exhausted, aborting scan"
            );
            self.abort(format!("ran out of sockets while probing {}", outcome.target));
            return;
        }

        let mut inner = lock(&self.inner);
        if inner.phase != ScanPhase::Running {
            debug!(scan = self.id, target = %outcome.target, "discarding late probe result");
            return;
        }

        if outcome.reachable {
            let server = DiscoveredServer {
                label: self.request.label_for(&outcome.target),
                address: outcome.target.to_string(),
                latency_ms: outcome.latency_ms,
                discovered_at: now_iso_like(),
            };
            info!(
                scan = self.id,
                address = %server.address,
                latency_ms = server.latency_ms,
                "found server"
            );
            inner.servers.push(server.clone());
            self.emit(ScanEvent::ServerFound {
                scan_id: self.id,
                server,
            });
        }

        if let Some(snapshot) = self.progress.record(outcome.reachable) {
            self.emit(ScanEvent::Progress {
                scan_id: self.id,
                snapshot,
            });
        }

        if self.progress.is_done() {
            self.finish(&mut inner, ScanPhase::Completed);
        }
    }

    fn cancel(&self) {
        let mut inner = lock(&self.inner);
        if inner.phase.is_terminal() {
            return;
        }
        self.finish(&mut inner, ScanPhase::Cancelled);
    }

    /// Fatal problem: end the scan as cancelled and record why.
    fn abort(&self, reason: String) {
        let mut inner = lock(&self.inner);
        if inner.phase.is_terminal() {
            return;
        }
        inner.aborted = Some(reason);
        self.finish(&mut inner, ScanPhase::Cancelled);
    }

    /// The only place a scan leaves `Running`. Caller holds the lock.
    fn finish(&self, inner: &mut Inner, phase: ScanPhase) {
        inner.phase = phase;
        self.cancel.cancel();
        let snap = self.progress.snapshot();
        info!(
            scan = self.id,
            ?phase,
            processed = snap.processed,
            total = snap.total,
            found = inner.servers.len(),
            "scan finished"
        );
        self.emit(ScanEvent::Complete {
            scan_id: self.id,
            servers: inner.servers.clone(),
            cancelled: phase == ScanPhase::Cancelled,
            aborted: inner.aborted.clone(),
        });
        self.done.send_replace(phase);
    }

    fn emit(&self, event: ScanEvent) {
        if self.events.send(event).is_err() {
            debug!(scan = self.id, "event queue closed");
        }
    }
}

/// Feed the request's targets through the pool and settle the scan.
async fn drive(state: Arc<ScanState>, prober: Arc<dyn Prober>, config: ScanConfig) {
    if state.progress.total() == 0 {
        let mut inner = lock(&state.inner);
        if inner.phase == ScanPhase::Running {
            state.finish(&mut inner, ScanPhase::Completed);
        }
        return;
    }

    let worker_state = state.clone();
    let exit = run_pool(
        state.request.targets(),
        prober,
        config.effective_concurrency(),
        config.timeout_for(&state.request.mode()),
        state.cancel.clone(),
        move |outcome| worker_state.on_outcome(outcome),
    )
    .await;

    if exit == PoolExit::Drained && !state.progress.is_done() {
        // A worker died without reporting its target.
        state.abort("probe worker failed before finishing its target".to_string());
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_iso_like() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
