//! Once-a-day run loop.
//!
//! Missed occurrences are never caught up: the next run is always the first
//! occurrence after both the current time and the previous run's slot.

use chrono::{DateTime, Days, NaiveTime, Utc};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::RunReport;
use crate::error::PipelineError;

/// First occurrence of `at` (UTC) strictly after `after`.
pub fn next_run(after: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let candidate = after.date_naive().and_time(at).and_utc();
    if candidate > after {
        candidate
    } else {
        candidate
            .checked_add_days(Days::new(1))
            .unwrap_or(candidate)
    }
}

/// Run `run` once per day at `at` until `shutdown` is cancelled.
///
/// Runs never overlap. A failed run is logged and the loop waits for the
/// next occurrence. Cancellation during a run abandons it at its next await
/// point.
pub async fn run_daily<F, Fut>(at: NaiveTime, shutdown: CancellationToken, mut run: F)
where
    F: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<RunReport, PipelineError>>,
{
    let mut previous: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let after = previous.map_or(now, |slot| slot.max(now));
        let scheduled = next_run(after, at);
        let wait = (scheduled - now).to_std().unwrap_or_default();

        info!(
            next_run = %scheduled,
            wait_secs = wait.as_secs(),
            "Waiting for next scheduled run"
        );

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Shutdown requested while waiting");
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        previous = Some(scheduled);
        info!(scheduled = %scheduled, "Starting scheduled run");

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Shutdown requested during run");
                break;
            }
            result = run(scheduled) => match result {
                Ok(report) => report.log_summary(),
                Err(e) => error!(error = %e, scheduled = %scheduled, "Scheduled run failed"),
            },
        }
    }
}
