//! The probe loop for a single host.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{LoopConfig, ResultSender};
use crate::history::Sample;
use crate::probe::{ProbeOutcome, Prober};

/// Slack on top of the configured timeout before the loop gives up on a
/// probe that ignores its own deadline.
pub const PROBE_GRACE: Duration = Duration::from_secs(3);

/// Probe `host` until `max_count` attempts were made or `cancel` flips to
/// `true` (or its sender is dropped).
///
/// Ticks are anchored to the start time, so a slow probe does not push
/// later ticks back; a tick that is already due fires immediately. A probe
/// still in flight at cancellation is dropped without publishing.
///
/// Returns the number of samples published.
pub async fn run_probe_loop(
    host: String,
    config: LoopConfig,
    prober: Arc<dyn Prober>,
    results: ResultSender,
    mut cancel: watch::Receiver<bool>,
) -> u64 {
    let probe_limit = config.timeout() + PROBE_GRACE;
    let mut sequence: u64 = 0;
    let mut next_tick = Instant::now();

    info!(%host, interval = ?config.interval(), max_count = ?config.max_count(), "probe loop started");

    loop {
        let stop_requested = *cancel.borrow();
        if stop_requested {
            break;
        }
        if config.max_count().is_some_and(|max| sequence >= max) {
            break;
        }

        let timestamp = Utc::now();
        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            result = tokio::time::timeout(probe_limit, prober.probe(&host, config.timeout())) => {
                result.unwrap_or_else(|_| {
                    debug!(%host, sequence, "probe overran its deadline");
                    ProbeOutcome::failure()
                })
            }
        };

        if !results.publish(Sample::from_outcome(host.as_str(), sequence, timestamp, outcome)) {
            debug!(%host, "result channel closed");
            break;
        }
        sequence += 1;

        if config.max_count().is_some_and(|max| sequence >= max) {
            break;
        }

        next_tick += config.interval();
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = tokio::time::sleep_until(next_tick) => {}
        }
    }

    info!(%host, attempts = sequence, "probe loop stopped");
    sequence
}

/// Resolves once `true` is sent or the sender is dropped.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}
