//! Streaming statistics over a window of latencies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::History;

/// Arithmetic mean, `None` for an empty slice.
///
/// The result is kept within the range of the inputs, so a window of equal
/// values has exactly that value as its mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (min, max) = bounds(values)?;
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(mean.max(min).min(max))
}

/// Population standard deviation (divides by N).
///
/// Needs at least two values; a single point has a mean but no spread.
/// Equal values have a spread of exactly zero, and so does any residue
/// within one ulp of the mean.
pub fn population_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let (min, max) = bounds(values)?;
    if min == max {
        return Some(0.0);
    }
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let stdev = variance.sqrt();
    if stdev <= f64::EPSILON * mean.abs() {
        return Some(0.0);
    }
    Some(stdev)
}

fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    let min = values.iter().copied().reduce(f64::min)?;
    let max = values.iter().copied().reduce(f64::max)?;
    Some((min, max))
}

/// Count values strictly above `mean + k * stdev`.
///
/// Zero when the spread is undefined or zero.
pub fn count_above_sigma(values: &[f64], k: f64) -> usize {
    let (Some(mean), Some(stdev)) = (mean(values), population_stdev(values)) else {
        return 0;
    };
    if stdev == 0.0 {
        return 0;
    }
    let threshold = mean + k * stdev;
    values.iter().filter(|&&v| v > threshold).count()
}

/// Longest run of consecutive `false` outcomes, in iteration order.
pub fn longest_failure_run<I>(outcomes: I) -> usize
where
    I: IntoIterator<Item = bool>,
{
    let mut longest = 0;
    let mut current = 0;
    for success in outcomes {
        if success {
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }
    longest
}

/// Round to `places` decimals, correctly rounded from the exact binary
/// value with ties to even: `81.25` gives `81.2`.
pub fn round_to(value: f64, places: usize) -> f64 {
    format!("{value:.places$}").parse().unwrap_or(value)
}

/// Point-in-time summary of one host's window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostReport {
    pub host: String,
    pub description: String,
    /// Responder of the most recent probe, if it answered.
    pub responder_address: Option<String>,
    pub last_latency_ms: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub sent: usize,
    pub received: usize,
    pub loss_percent: f64,
    pub min_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub mean_ms: Option<f64>,
    pub stdev_ms: Option<f64>,
    pub above_1sigma: usize,
    pub above_2sigma: usize,
    pub longest_loss_streak: usize,
}

impl From<&History> for HostReport {
    fn from(history: &History) -> Self {
        let last = history.last();
        let (sent, received, loss_percent) = history.counts();
        let (min_ms, avg_ms, max_ms) = history.latency_stats();
        let (mean_ms, stdev_ms) = history.latency_sigma();

        Self {
            host: history.host().to_string(),
            description: history.description().to_string(),
            responder_address: last.and_then(|s| s.responder_address.clone()),
            last_latency_ms: last.and_then(|s| s.latency_ms),
            last_seen: last.map(|s| s.timestamp),
            sent,
            received,
            loss_percent,
            min_ms,
            avg_ms,
            max_ms,
            mean_ms,
            stdev_ms,
            above_1sigma: history.count_above_sigma(1.0),
            above_2sigma: history.count_above_sigma(2.0),
            longest_loss_streak: history.longest_loss_streak(),
        }
    }
}
