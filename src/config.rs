//! Configuration module for multiping.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Values that are present but malformed or non-positive are rejected.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::LoopConfig;

/// Configuration error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("probe interval must be positive, got {0:?}")]
    Interval(Duration),
    #[error("probe timeout must be positive, got {0:?}")]
    Timeout(Duration),
    #[error("window size must be positive")]
    WindowSize,
    #[error("max count must be positive when set")]
    MaxCount,
    #[error("no hosts configured")]
    NoHosts,
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Monitor configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Hosts to probe, in display order.
    pub hosts: Vec<String>,
    /// Time between probes of one host (default: 1s)
    pub interval: Duration,
    /// Upper bound for one probe attempt (default: 1000ms)
    pub timeout: Duration,
    /// Window size and number of probes per host (default: 60)
    pub count: usize,
    /// How often the collector drains results (default: 500ms)
    pub refresh: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                "8.8.8.8".to_string(),
                "1.1.1.1".to_string(),
                "google.com".to_string(),
            ],
            interval: Duration::from_secs(1),
            timeout: Duration::from_millis(1000),
            count: 60,
            refresh: Duration::from_millis(500),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MULTIPING_HOSTS`: comma or whitespace separated hosts
    /// - `MULTIPING_INTERVAL_SECS`: seconds between probes, fractional allowed
    /// - `MULTIPING_TIMEOUT_MS`: per-probe timeout in milliseconds
    /// - `MULTIPING_COUNT`: window size and probes per host
    /// - `MULTIPING_REFRESH_MS`: collector refresh period in milliseconds
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(hosts) = lookup("MULTIPING_HOSTS") {
            cfg.hosts = split_hosts(&hosts);
        }

        if let Some(value) = lookup("MULTIPING_INTERVAL_SECS") {
            cfg.interval = parse_positive_secs("MULTIPING_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = lookup("MULTIPING_TIMEOUT_MS") {
            cfg.timeout = Duration::from_millis(parse_positive_u64("MULTIPING_TIMEOUT_MS", &value)?);
        }

        if let Some(value) = lookup("MULTIPING_COUNT") {
            cfg.count = parse_positive_u64("MULTIPING_COUNT", &value)? as usize;
        }

        if let Some(value) = lookup("MULTIPING_REFRESH_MS") {
            cfg.refresh = Duration::from_millis(parse_positive_u64("MULTIPING_REFRESH_MS", &value)?);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every invariant the probing core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        if self.count == 0 {
            return Err(ConfigError::WindowSize);
        }
        if self.refresh.is_zero() {
            return Err(ConfigError::Invalid {
                var: "refresh",
                value: format!("{:?}", self.refresh),
            });
        }
        self.loop_config().map(|_| ())
    }

    /// Loop parameters for every host: one run is `count` probes.
    pub fn loop_config(&self) -> Result<LoopConfig, ConfigError> {
        LoopConfig::new(self.interval, self.timeout, Some(self.count as u64))
    }
}

/// Split a plain host list. No ranges or CIDR blocks are expanded.
fn split_hosts(value: &str) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    for host in value.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        if !host.is_empty() && !hosts.iter().any(|h| h == host) {
            hosts.push(host.to_string());
        }
    }
    hosts
}

fn parse_positive_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs = value.trim().parse::<f64>().ok().filter(|v| *v > 0.0);
    match secs.and_then(|v| Duration::try_from_secs_f64(v).ok()) {
        Some(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_positive_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}
