use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::config::Settings;
use crate::fetch::PageSource;
use crate::pipeline::{self, RunReport};

/// Run the pipeline now and then once every `every` until `shutdown`
/// resolves. Runs happen inline, so two never overlap; ticks missed while a
/// run is in progress are dropped rather than replayed.
pub async fn run_every<S, F>(
    settings: &Settings,
    new_source: F,
    every: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<()>
where
    S: PageSource,
    F: Fn() -> Result<S>,
{
    let start = Instant::now();
    let mut ticker = tokio::time::interval_at(start, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }

        tokio::select! {
            result = pipeline::run_once(settings, &new_source) => log_run(result),
            _ = &mut shutdown => {
                info!("Shutdown requested, abandoning current run");
                break;
            }
        }

        let now = Instant::now();
        let wait = next_tick(start, every, now) - now;
        if let Ok(step) = chrono::Duration::from_std(wait) {
            info!("Next run at {}", (Local::now() + step).format("%Y-%m-%d %H:%M:%S"));
        }
    }

    info!("Scheduler stopped");
    Ok(())
}

/// First tick of a schedule started at `start` that falls after `now`.
/// Ticks missed during a long run are skipped, so this is never in the past.
fn next_tick(start: Instant, every: Duration, now: Instant) -> Instant {
    if every.is_zero() {
        return now;
    }
    let elapsed = now.saturating_duration_since(start).as_nanos();
    let ticks = elapsed / every.as_nanos() + 1;
    start + Duration::from_nanos((every.as_nanos() * ticks) as u64)
}

/// Resolves once `signal` fires. If the handler cannot be installed the
/// error is logged and this never resolves.
pub async fn shutdown_on(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn log_run(result: Result<RunReport>) {
    match result {
        Ok(report) => info!(
            "Run from {} finished: {} links, {} records, {} rows in {:.1}s",
            report.started_at.format("%Y-%m-%d %H:%M:%S"),
            report.links,
            report.records,
            report.rows,
            report.elapsed.as_secs_f64()
        ),
        Err(e) => error!("Run failed: {:#}", e),
    }
}
