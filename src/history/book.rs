//! Consumer side of the result channel.
//!
//! [`HistoryBook`] owns every host's [`History`]; [`Collector`] is the single
//! writer that moves samples from the channel into it.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{History, HostReport, Sample};
use crate::config::ConfigError;
use crate::scheduler::{cancelled, ResultDrain};

/// Descriptions longer than this are cut.
pub const MAX_DESCRIPTION_CHARS: usize = 20;

/// Histories of all monitored hosts.
#[derive(Debug, Clone)]
pub struct HistoryBook {
    default_capacity: usize,
    histories: BTreeMap<String, History>,
}

impl HistoryBook {
    /// `default_capacity` is used for hosts registered later, including
    /// hosts first seen through an incoming sample.
    pub fn new(default_capacity: usize) -> Result<Self, ConfigError> {
        if default_capacity == 0 {
            return Err(ConfigError::WindowSize);
        }
        Ok(Self {
            default_capacity,
            histories: BTreeMap::new(),
        })
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Register a host. Returns `false` if it is already known, in which
    /// case nothing changes.
    pub fn add_host(&mut self, host: &str, description: &str) -> bool {
        if self.histories.contains_key(host) {
            return false;
        }
        let description: String = description.trim().chars().take(MAX_DESCRIPTION_CHARS).collect();
        let history = empty_history(host, self.default_capacity).with_description(description);
        self.histories.insert(host.to_string(), history);
        true
    }

    /// Forget a host and everything recorded for it.
    pub fn remove_host(&mut self, host: &str) -> Option<History> {
        self.histories.remove(host)
    }

    pub fn get(&self, host: &str) -> Option<&History> {
        self.histories.get(host)
    }

    pub fn get_mut(&mut self, host: &str) -> Option<&mut History> {
        self.histories.get_mut(host)
    }

    pub fn contains(&self, host: &str) -> bool {
        self.histories.contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Hosts in display order (case-insensitive).
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.histories.keys().map(String::as_str).collect();
        hosts.sort_by_key(|h| h.to_lowercase());
        hosts
    }

    /// Append a sample to its host's history, registering the host first if
    /// it is unknown.
    pub fn ingest(&mut self, sample: Sample) {
        let capacity = self.default_capacity;
        self.histories
            .entry(sample.host.clone())
            .or_insert_with_key(|host| {
                debug!(%host, "registering host seen in results");
                empty_history(host, capacity)
            })
            .push(sample);
    }

    /// Resize every window and make `capacity` the new default.
    pub fn resize_all(&mut self, capacity: usize) -> Result<(), ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::WindowSize);
        }
        for history in self.histories.values_mut() {
            history.resize(capacity)?;
        }
        self.default_capacity = capacity;
        Ok(())
    }

    /// Empty every window, keeping hosts, capacities and descriptions.
    pub fn reset_all(&mut self) {
        for history in self.histories.values_mut() {
            history.reset();
        }
    }

    /// Summaries of all hosts in display order.
    pub fn reports(&self) -> Vec<HostReport> {
        self.hosts()
            .into_iter()
            .filter_map(|host| self.histories.get(host))
            .map(HostReport::from)
            .collect()
    }
}

fn empty_history(host: &str, capacity: usize) -> History {
    History {
        host: host.to_string(),
        capacity,
        description: String::new(),
        samples: Default::default(),
    }
}

/// The single consumer: drains the result channel into a [`HistoryBook`].
#[derive(Debug)]
pub struct Collector {
    drain: ResultDrain,
    book: HistoryBook,
}

impl Collector {
    pub fn new(drain: ResultDrain, book: HistoryBook) -> Self {
        Self { drain, book }
    }

    /// Append everything queued right now, in arrival order. Never waits.
    ///
    /// Returns the number of samples appended.
    pub fn poll(&mut self) -> usize {
        let book = &mut self.book;
        self.drain.drain_with(|sample| book.ingest(sample))
    }

    pub fn book(&self) -> &HistoryBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut HistoryBook {
        &mut self.book
    }

    pub fn into_book(self) -> HistoryBook {
        self.book
    }
}

/// Run `collector` on a fixed cadence until `shutdown` flips to `true`.
///
/// Every tick drains the channel and publishes fresh reports on the returned
/// watch channel. On shutdown a last drain is done and the collector is
/// handed back through the join handle.
pub fn spawn_collector(
    collector: Collector,
    refresh: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> (JoinHandle<Collector>, watch::Receiver<Vec<HostReport>>) {
    let (reports_tx, reports_rx) = watch::channel(collector.book().reports());

    let handle = tokio::spawn(async move {
        let mut collector = collector;
        let mut interval = tokio::time::interval(refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                _ = interval.tick() => {
                    let appended = collector.poll();
                    if appended > 0 {
                        debug!(appended, "Collector: appended samples");
                    }
                    reports_tx.send_replace(collector.book().reports());
                }
            }
        }

        let appended = collector.poll();
        reports_tx.send_replace(collector.book().reports());
        info!(appended, hosts = collector.book().len(), "Collector: stopped");
        collector
    });

    (handle, reports_rx)
}
