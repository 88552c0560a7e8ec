use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProbeError;
use crate::probe::Prober;
use crate::types::{ProbeOutcome, ProbeTarget};

/// How the pool stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolExit {
    /// Every submitted probe ran to completion.
    Drained,
    /// The token fired; in-flight probes were aborted.
    Cancelled,
}

/// Probe `targets` with at most `concurrency` connects in flight.
///
/// - Limits concurrent probes using a `Semaphore`.
/// - Bounds every probe with `timeout`.
/// - Calls `on_outcome` exactly once for every probe that finishes before cancellation.
/// - Stops submitting as soon as `cancel` fires and aborts whatever is still running.
///
/// No probe task outlives this future.
pub async fn run_pool<I, F>(
    targets: I,
    prober: Arc<dyn Prober>,
    concurrency: usize,
    timeout: Duration,
    cancel: CancellationToken,
    on_outcome: F,
) -> PoolExit
where
    I: IntoIterator<Item = ProbeTarget>,
    F: Fn(ProbeOutcome) + Send + Sync + 'static,
{
    let on_outcome = Arc::new(on_outcome);
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for target in targets {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        // Reap finished tasks so long sweeps don't pile up handles.
        while set.try_join_next().is_some() {}

        let prober = prober.clone();
        let on_outcome = on_outcome.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let _permit = permit;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                outcome = probe_one(prober.as_ref(), target, timeout) => outcome,
            };
            on_outcome(outcome);
        });
    }

    let cancelled = tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = drain(&mut set) => false,
    };
    if cancelled {
        set.shutdown().await;
        PoolExit::Cancelled
    } else {
        PoolExit::Drained
    }
}

async fn drain(set: &mut JoinSet<()>) {
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                debug!("probe task panicked: {e}");
            }
        }
    }
}

/// Run one probe under the timeout and turn the result into an outcome.
pub async fn probe_one(
    prober: &dyn Prober,
    target: ProbeTarget,
    timeout: Duration,
) -> ProbeOutcome {
    let start = Instant::now();
    let res = match time::timeout(timeout, prober.probe(target)).await {
        Ok(res) => res,
        Err(_) => Err(ProbeError::TimedOut),
    };
    let latency_ms = start.elapsed().as_millis() as u64;
    match res {
        Ok(()) => ProbeOutcome {
            target,
            reachable: true,
            latency_ms,
            error: None,
        },
        Err(e) => {
            debug!(%target, error = %e, "probe failed");
            ProbeOutcome {
                target,
                reachable: false,
                latency_ms,
                error: Some(e),
            }
        }
    }
}
