//! multiping - concurrent ping monitor for many hosts.
//!
//! One probe loop per host feeds a single result channel; one collector
//! drains it into bounded per-host histories that answer loss and latency
//! statistics on demand.
//!
//! ```text
//! ProbeSupervisor ── run_probe_loop (per host) ── Prober::probe
//!                          │
//!                          ▼
//!                    result_channel ──► Collector ──► HistoryBook ──► HostReport
//! ```

pub mod config;
pub mod history;
pub mod probe;
pub mod scheduler;

pub use config::{ConfigError, MonitorConfig};
pub use history::{spawn_collector, Collector, History, HistoryBook, HostReport, Sample};
pub use probe::{PingCommand, ProbeOutcome, Prober};
pub use scheduler::{result_channel, LoopConfig, ProbeSupervisor, StopOutcome};
