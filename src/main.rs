//! multiping - watch loss and latency of many hosts at once.
//!
//! Probes every configured host `MULTIPING_COUNT` times, logs a status line
//! per host on every refresh and prints the final summary as JSON.

use multiping::{
    result_channel, spawn_collector, Collector, HistoryBook, HostReport, MonitorConfig,
    PingCommand, ProbeSupervisor, StopOutcome,
};

use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("multiping=info".parse()?))
        .init();

    // Load configuration
    let cfg = MonitorConfig::load()?;
    let loop_config = cfg.loop_config()?;
    tracing::info!(
        "Probing {} hosts every {:?}, {} probes each, timeout {:?}",
        cfg.hosts.len(),
        cfg.interval,
        cfg.count,
        cfg.timeout
    );

    let (results, drain) = result_channel();
    let supervisor = ProbeSupervisor::new(Arc::new(PingCommand::new()), results);

    let mut book = HistoryBook::new(cfg.count)?;
    for host in &cfg.hosts {
        book.add_host(host, "");
    }

    let (stop_collector, stop_rx) = watch::channel(false);
    let (collector, mut reports) = spawn_collector(Collector::new(drain, book), cfg.refresh, stop_rx);

    for host in &cfg.hosts {
        supervisor.start(host, loop_config).await;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut refresh = tokio::time::interval(cfg.refresh);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping probe loops");
                for (host, outcome) in supervisor.stop_all().await {
                    if outcome == StopOutcome::Abandoned {
                        tracing::warn!("Probe loop for {} was abandoned", host);
                    }
                }
                break;
            }
            _ = refresh.tick() => {
                let snapshot = reports.borrow_and_update().clone();
                for report in &snapshot {
                    log_status(report);
                }

                supervisor.reclaim_finished().await;
                if supervisor.running_hosts().await.is_empty() {
                    tracing::info!("All probe loops finished");
                    break;
                }
            }
        }
    }

    let _ = stop_collector.send(true);
    let collector = collector.await?;

    let summary = collector.book().reports();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn log_status(report: &HostReport) {
    let fmt = |v: Option<f64>| v.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string());

    tracing::info!(
        "{:<24} {:>15} sent={:<4} recv={:<4} loss={:>5.1}% last={} min/avg/max={}/{}/{} ms",
        report.host,
        report.responder_address.as_deref().unwrap_or("-"),
        report.sent,
        report.received,
        report.loss_percent,
        fmt(report.last_latency_ms),
        fmt(report.min_ms),
        fmt(report.avg_ms),
        fmt(report.max_ms),
    );
}
