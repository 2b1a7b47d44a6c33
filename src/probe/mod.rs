//! Probe module for network monitoring.
//!
//! The probing core only sees the [`Prober`] trait: given a host and a
//! timeout, produce a [`ProbeOutcome`]. [`PingCommand`] is the adapter that
//! shells out to the system `ping`.

mod ping;

pub use ping::*;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Probe error types.
///
/// These stay inside probe adapters; callers of [`Prober::probe`] only ever
/// see a failed [`ProbeOutcome`].
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("command failed: {0}")]
    Command(String),
    #[error("no reply found in ping output")]
    NoReply,
}

/// Outcome of one probe attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub responder_address: Option<String>,
    pub ttl: Option<u32>,
}

impl ProbeOutcome {
    pub fn success(latency_ms: f64, responder_address: Option<String>, ttl: Option<u32>) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency_ms),
            responder_address,
            ttl,
        }
    }

    /// A failed probe with every optional field absent.
    pub fn failure() -> Self {
        Self::default()
    }
}

impl From<Result<ProbeOutcome, ProbeError>> for ProbeOutcome {
    fn from(result: Result<ProbeOutcome, ProbeError>) -> Self {
        result.unwrap_or_else(|_| Self::failure())
    }
}

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>>;

/// Something that can probe a host.
///
/// Implementations must not fail: every error is reported as
/// [`ProbeOutcome::failure`]. They should also return within `timeout` plus a
/// small grace margin, although the probe loop enforces that bound anyway.
pub trait Prober: Send + Sync {
    fn probe<'a>(&'a self, host: &'a str, timeout: Duration) -> ProbeFuture<'a>;
}
