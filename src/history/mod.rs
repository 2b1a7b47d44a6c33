//! Per-host rolling sample history.
//!
//! A [`History`] keeps the most recent `capacity` samples for one host and
//! answers statistics queries over exactly that window. Nothing is cached:
//! every query rescans the retained samples, so eviction, resize and reset
//! are reflected by the very next call.

mod book;
pub mod stats;

pub use book::*;
pub use stats::HostReport;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ConfigError;
use crate::probe::ProbeOutcome;

/// The recorded outcome of one probe attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Host as it was probed, not necessarily resolved.
    pub host: String,
    pub success: bool,
    /// Round-trip time in milliseconds; only set on success.
    pub latency_ms: Option<f64>,
    pub responder_address: Option<String>,
    /// Only set on success, and only when the probe reported it.
    pub ttl: Option<u32>,
    /// Per-loop attempt counter, starting at 0.
    pub sequence: u64,
}

impl Sample {
    pub fn success(
        host: impl Into<String>,
        sequence: u64,
        timestamp: DateTime<Utc>,
        latency_ms: f64,
    ) -> Self {
        Self {
            timestamp,
            host: host.into(),
            success: true,
            latency_ms: Some(latency_ms),
            responder_address: None,
            ttl: None,
            sequence,
        }
    }

    pub fn failure(host: impl Into<String>, sequence: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            host: host.into(),
            success: false,
            latency_ms: None,
            responder_address: None,
            ttl: None,
            sequence,
        }
    }

    /// Build a sample from a probe outcome.
    ///
    /// Optional fields of a failed outcome are dropped, whatever the probe
    /// filled in.
    pub fn from_outcome(
        host: impl Into<String>,
        sequence: u64,
        timestamp: DateTime<Utc>,
        outcome: ProbeOutcome,
    ) -> Self {
        match outcome.latency_ms {
            Some(latency_ms) if outcome.success => Self {
                responder_address: outcome.responder_address,
                ttl: outcome.ttl,
                ..Self::success(host, sequence, timestamp, latency_ms)
            },
            _ => Self::failure(host, sequence, timestamp),
        }
    }
}

/// Fixed-capacity window of the most recent samples for one host.
#[derive(Debug, Clone)]
pub struct History {
    host: String,
    capacity: usize,
    description: String,
    samples: VecDeque<Sample>,
}

impl History {
    /// Create an empty history. A zero capacity is rejected.
    pub fn new(host: impl Into<String>, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::WindowSize);
        }
        Ok(Self {
            host: host.into(),
            capacity,
            description: String::new(),
            samples: VecDeque::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Append a sample, evicting the oldest one once the window is full.
    pub fn push(&mut self, sample: Sample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Change the window size, keeping the newest samples when shrinking.
    pub fn resize(&mut self, capacity: usize) -> Result<(), ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::WindowSize);
        }
        if self.samples.len() > capacity {
            let excess = self.samples.len() - capacity;
            self.samples.drain(..excess);
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Drop all samples; capacity and description stay.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// `(sent, received, loss_percent)` over the window.
    ///
    /// An empty window counts as 100% loss.
    pub fn counts(&self) -> (usize, usize, f64) {
        let sent = self.samples.len();
        let received = self.samples.iter().filter(|s| s.success).count();
        let loss = if sent == 0 {
            100.0
        } else {
            stats::round_to((1.0 - received as f64 / sent as f64) * 100.0, 1)
        };
        (sent, received, loss)
    }

    /// `(min, avg, max)` of successful latencies, `avg` rounded to whole
    /// milliseconds with ties to even.
    pub fn latency_stats(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        let latencies = self.latencies();
        let min = latencies.iter().copied().reduce(f64::min);
        let max = latencies.iter().copied().reduce(f64::max);
        let avg = stats::mean(&latencies).map(f64::round_ties_even);
        (min, avg, max)
    }

    /// Mean and population standard deviation of successful latencies.
    pub fn latency_sigma(&self) -> (Option<f64>, Option<f64>) {
        let latencies = self.latencies();
        (stats::mean(&latencies), stats::population_stdev(&latencies))
    }

    /// Successful latencies strictly above `mean + k * stdev`.
    pub fn count_above_sigma(&self, k: f64) -> usize {
        stats::count_above_sigma(&self.latencies(), k)
    }

    pub fn longest_loss_streak(&self) -> usize {
        stats::longest_failure_run(self.samples.iter().map(|s| s.success))
    }

    /// Timestamps and latencies for plotting. Failed probes are `None`,
    /// which must be drawn as a gap rather than as zero.
    pub fn series(&self) -> (Vec<DateTime<Utc>>, Vec<Option<f64>>) {
        self.samples
            .iter()
            .map(|s| (s.timestamp, if s.success { s.latency_ms } else { None }))
            .unzip()
    }

    fn latencies(&self) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| s.success)
            .filter_map(|s| s.latency_ms)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rand::Rng;

    fn at(seq: u64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(seq as i64)
    }

    fn ok(seq: u64, latency: f64) -> Sample {
        Sample::success("a", seq, at(seq), latency)
    }

    fn fail(seq: u64) -> Sample {
        Sample::failure("a", seq, at(seq))
    }

    fn sequences(history: &History) -> Vec<u64> {
        history.samples().map(|s| s.sequence).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(History::new("a", 0).unwrap_err(), ConfigError::WindowSize);
        let mut history = History::new("a", 3).unwrap();
        assert_eq!(history.resize(0).unwrap_err(), ConfigError::WindowSize);
        assert_eq!(history.capacity(), 3);
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut history = History::new("a", 5).unwrap();
        for seq in 0..12 {
            history.push(ok(seq, 10.0));
            assert!(history.len() <= 5);
        }
        assert_eq!(sequences(&history), vec![7, 8, 9, 10, 11]);
        assert_eq!(history.last().map(|s| s.sequence), Some(11));
    }

    #[test]
    fn test_resize_keeps_newest() {
        let mut history = History::new("a", 10).unwrap();
        for seq in 0..10 {
            history.push(ok(seq, 10.0));
        }
        history.resize(4).unwrap();
        assert_eq!(sequences(&history), vec![6, 7, 8, 9]);

        history.resize(6).unwrap();
        assert_eq!(sequences(&history), vec![6, 7, 8, 9]);
        history.push(ok(10, 10.0));
        history.push(ok(11, 10.0));
        history.push(ok(12, 10.0));
        assert_eq!(sequences(&history), vec![7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_resize_up_then_down_is_identity() {
        let mut history = History::new("a", 4).unwrap();
        for seq in 0..6 {
            history.push(if seq % 2 == 0 { ok(seq, seq as f64) } else { fail(seq) });
        }
        let before: Vec<Sample> = history.samples().cloned().collect();
        history.resize(50).unwrap();
        history.resize(4).unwrap();
        let after: Vec<Sample> = history.samples().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reset_keeps_settings() {
        let mut history = History::new("a", 7).unwrap().with_description("core router");
        history.push(ok(0, 1.0));
        history.reset();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 7);
        assert_eq!(history.description(), "core router");
        assert!(history.last().is_none());
    }

    #[test]
    fn test_empty_counts_are_total_loss() {
        let history = History::new("a", 3).unwrap();
        assert_eq!(history.counts(), (0, 0, 100.0));
        assert_eq!(history.latency_stats(), (None, None, None));
        assert_eq!(history.latency_sigma(), (None, None));
        assert_eq!(history.count_above_sigma(1.0), 0);
        assert_eq!(history.longest_loss_streak(), 0);
    }

    #[test]
    fn test_loss_rounded_to_one_decimal() {
        let mut history = History::new("a", 10).unwrap();
        history.push(ok(0, 5.0));
        history.push(fail(1));
        history.push(fail(2));
        let (sent, received, loss) = history.counts();
        assert_eq!((sent, received), (3, 1));
        assert_eq!(loss, 66.7);
    }

    #[test]
    fn test_latency_stats() {
        let mut history = History::new("a", 10).unwrap();
        history.push(ok(0, 10.25));
        history.push(fail(1));
        history.push(ok(2, 20.75));
        history.push(ok(3, 12.5));
        let (min, avg, max) = history.latency_stats();
        assert_eq!(min, Some(10.25));
        assert_eq!(max, Some(20.75));
        // mean is 14.5 exactly
        assert_eq!(avg, Some(14.0));

        history.push(ok(4, 16.5));
        assert_eq!(history.latency_stats().1, Some(15.0));
    }

    #[test]
    fn test_loss_ties_round_to_even() {
        let mut history = History::new("a", 16).unwrap();
        for seq in 0..16 {
            history.push(if seq < 3 { ok(seq, 5.0) } else { fail(seq) });
        }
        assert_eq!(history.counts(), (16, 3, 81.2));
    }

    #[test]
    fn test_equal_latencies_nothing_above() {
        let mut history = History::new("a", 10).unwrap();
        for seq in 0..3 {
            history.push(ok(seq, 14.2));
        }
        assert_eq!(history.latency_sigma(), (Some(14.2), Some(0.0)));
        assert_eq!(history.count_above_sigma(0.0), 0);
        assert_eq!(HostReport::from(&history).above_1sigma, 0);
    }

    #[test]
    fn test_huge_capacity_is_not_preallocated() {
        let mut history = History::new("a", usize::MAX).unwrap();
        history.push(ok(0, 1.0));
        assert_eq!(history.capacity(), usize::MAX);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_sigma_single_sample() {
        let mut history = History::new("a", 10).unwrap();
        history.push(fail(0));
        history.push(ok(1, 42.0));
        assert_eq!(history.latency_sigma(), (Some(42.0), None));
        assert_eq!(history.count_above_sigma(0.0), 0);
    }

    #[test]
    fn test_sigma_is_population() {
        let mut history = History::new("a", 10).unwrap();
        for (seq, latency) in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().enumerate() {
            history.push(ok(seq as u64, latency));
        }
        let (mean, stdev) = history.latency_sigma();
        assert_eq!(mean, Some(5.0));
        assert!((stdev.unwrap() - 2.0).abs() < 1e-12);
        // only 9.0 is above 5 + 1 * 2
        assert_eq!(history.count_above_sigma(1.0), 1);
        assert_eq!(history.count_above_sigma(0.0), 2);
        assert_eq!(history.count_above_sigma(2.0), 0);
    }

    #[test]
    fn test_no_variance_nothing_above() {
        let mut history = History::new("a", 10).unwrap();
        for seq in 0..5 {
            history.push(ok(seq, 30.0));
        }
        history.push(fail(5));
        for k in [0.0, 1.0, 2.0, -1.0] {
            assert_eq!(history.count_above_sigma(k), 0);
        }
    }

    #[test]
    fn test_longest_loss_streak() {
        let mut history = History::new("a", 10).unwrap();
        history.push(ok(0, 1.0));
        history.push(fail(1));
        history.push(fail(2));
        history.push(ok(3, 1.0));
        history.push(fail(4));
        assert_eq!(history.longest_loss_streak(), 2);
    }

    #[test]
    fn test_series_marks_failures_as_gaps() {
        let mut history = History::new("a", 10).unwrap();
        history.push(ok(0, 11.0));
        history.push(fail(1));
        history.push(ok(2, 13.0));
        let (xs, ys) = history.series();
        assert_eq!(xs, vec![at(0), at(1), at(2)]);
        assert_eq!(ys, vec![Some(11.0), None, Some(13.0)]);
    }

    #[test]
    fn test_from_outcome_strips_failed_fields() {
        let outcome = ProbeOutcome {
            success: false,
            latency_ms: Some(3.0),
            responder_address: Some("10.0.0.1".to_string()),
            ttl: Some(64),
        };
        let sample = Sample::from_outcome("h", 4, at(0), outcome);
        assert_eq!(sample, Sample::failure("h", 4, at(0)));

        let sample = Sample::from_outcome("h", 5, at(1), ProbeOutcome::success(8.5, Some("10.0.0.1".into()), Some(57)));
        assert!(sample.success);
        assert_eq!(sample.latency_ms, Some(8.5));
        assert_eq!(sample.ttl, Some(57));
        assert_eq!(sample.responder_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_mixed_window_of_one_hundred() {
        let mut rng = rand::thread_rng();
        let mut history = History::new("a", 100).unwrap();
        for seq in 0..100u64 {
            if seq % 5 < 3 {
                history.push(fail(seq));
            } else {
                history.push(ok(seq, rng.gen_range(10.0..=50.0)));
            }
        }
        assert_eq!(history.counts(), (100, 40, 60.0));
        let (min, avg, max) = history.latency_stats();
        let (min, avg, max) = (min.unwrap(), avg.unwrap(), max.unwrap());
        assert!((10.0..=50.0).contains(&min));
        assert!((10.0..=50.0).contains(&max));
        assert!(min.floor() <= avg && avg <= max.ceil());
    }
}
