//! Scheduler module for running one probe loop per host.
//!
//! The [`ProbeSupervisor`] owns every running loop and keeps at most one per
//! host. Loops publish samples into the shared result channel and never touch
//! history state themselves.

mod channel;
mod probe_loop;

pub use channel::*;
pub use probe_loop::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::probe::Prober;

/// Validated parameters of a probe loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    interval: Duration,
    timeout: Duration,
    max_count: Option<u64>,
}

impl LoopConfig {
    /// Rejects a zero interval, a zero timeout and `Some(0)` as max count.
    pub fn new(
        interval: Duration,
        timeout: Duration,
        max_count: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::Interval(interval));
        }
        if timeout.is_zero() {
            return Err(ConfigError::Timeout(timeout));
        }
        if max_count == Some(0) {
            return Err(ConfigError::MaxCount);
        }
        Ok(Self {
            interval,
            timeout,
            max_count,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `None` means probe until stopped.
    pub fn max_count(&self) -> Option<u64> {
        self.max_count
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No loop was registered for the host.
    NotRunning,
    /// The loop acknowledged the stop within the grace period.
    Stopped,
    /// The loop did not finish in time and was aborted.
    Abandoned,
}

/// A registered loop.
struct LoopSlot {
    handle: JoinHandle<u64>,
    cancel: watch::Sender<bool>,
}

/// Owns the running probe loops, one per host.
///
/// All bookkeeping goes through one async mutex, so concurrent
/// `start`/`stop`/`reclaim_finished` calls are serialized. Dropping the
/// supervisor drops every cancel sender, which stops all loops.
pub struct ProbeSupervisor {
    prober: Arc<dyn Prober>,
    results: ResultSender,
    grace: Duration,
    loops: Mutex<BTreeMap<String, LoopSlot>>,
}

impl ProbeSupervisor {
    /// How long `stop` waits for a loop before abandoning it.
    pub const DEFAULT_GRACE: Duration = Duration::from_millis(1500);

    pub fn new(prober: Arc<dyn Prober>, results: ResultSender) -> Self {
        Self {
            prober,
            results,
            grace: Self::DEFAULT_GRACE,
            loops: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Start probing `host`. Returns `false`, leaving the running loop
    /// untouched, if the host is already registered.
    pub async fn start(&self, host: &str, config: LoopConfig) -> bool {
        let mut loops = self.loops.lock().await;

        if loops.contains_key(host) {
            return false; // Already running
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run_probe_loop(
            host.to_string(),
            config,
            self.prober.clone(),
            self.results.clone(),
            cancel_rx,
        ));
        loops.insert(host.to_string(), LoopSlot { handle, cancel });

        info!(%host, "Supervisor: started probe loop");
        true
    }

    /// Stop probing `host`, waiting at most the grace period.
    ///
    /// The registration is gone when this returns, whatever the outcome.
    pub async fn stop(&self, host: &str) -> StopOutcome {
        let slot = self.loops.lock().await.remove(host);

        match slot {
            Some(slot) => shutdown(host, slot, Instant::now() + self.grace).await,
            None => StopOutcome::NotRunning,
        }
    }

    /// Stop every registered loop.
    ///
    /// All loops are signalled first and then share one grace deadline, so a
    /// slow loop cannot eat into the others' time.
    pub async fn stop_all(&self) -> BTreeMap<String, StopOutcome> {
        let slots = std::mem::take(&mut *self.loops.lock().await);

        for slot in slots.values() {
            let _ = slot.cancel.send(true);
        }

        let deadline = Instant::now() + self.grace;
        let mut outcomes = BTreeMap::new();
        for (host, slot) in slots {
            let outcome = shutdown(&host, slot, deadline).await;
            outcomes.insert(host, outcome);
        }

        if !outcomes.is_empty() {
            info!(count = outcomes.len(), "Supervisor: stopped all probe loops");
        }
        outcomes
    }

    /// Unregister loops that ended on their own and return their hosts.
    pub async fn reclaim_finished(&self) -> Vec<String> {
        let mut loops = self.loops.lock().await;

        let finished: Vec<String> = loops
            .iter()
            .filter(|(_, slot)| slot.handle.is_finished())
            .map(|(host, _)| host.clone())
            .collect();

        for host in &finished {
            loops.remove(host);
            debug!(%host, "Supervisor: reclaimed finished probe loop");
        }

        finished
    }

    /// Snapshot of hosts whose loops are still executing.
    pub async fn running_hosts(&self) -> Vec<String> {
        let loops = self.loops.lock().await;

        loops
            .iter()
            .filter(|(_, slot)| !slot.handle.is_finished())
            .map(|(host, _)| host.clone())
            .collect()
    }

    /// Whether `host` has a registration, running or finished.
    pub async fn is_registered(&self, host: &str) -> bool {
        self.loops.lock().await.contains_key(host)
    }
}

async fn shutdown(host: &str, mut slot: LoopSlot, deadline: Instant) -> StopOutcome {
    let _ = slot.cancel.send(true);

    match tokio::time::timeout_at(deadline, &mut slot.handle).await {
        Ok(Ok(attempts)) => {
            info!(%host, attempts, "Supervisor: stopped probe loop");
            StopOutcome::Stopped
        }
        Ok(Err(e)) => {
            warn!(%host, error = %e, "Supervisor: probe loop ended abnormally");
            StopOutcome::Stopped
        }
        Err(_) => {
            slot.handle.abort();
            warn!(%host, "Supervisor: probe loop did not stop in time, abandoned");
            StopOutcome::Abandoned
        }
    }
}
