//! Background sweep over persisted deadlines: no-show timers, auto-releases
//! and no-show capture retries.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tokio::time::interval;

use crate::services::{escrow, no_show};
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub no_shows_charged: usize,
    pub auto_released: usize,
    pub captures_recovered: usize,
}

/// One pass. Each step runs even if an earlier one failed.
pub async fn run_sweep(state: &Arc<AppState>, now: NaiveDateTime) -> SweepReport {
    let mut report = SweepReport::default();

    match no_show::fire_due_timers(state, now).await {
        Ok(n) => report.no_shows_charged = n,
        Err(e) => tracing::error!(error = %e, "error firing no-show timers"),
    }

    match escrow::run_auto_releases(state, now).await {
        Ok(n) => report.auto_released = n,
        Err(e) => tracing::error!(error = %e, "error running auto-releases"),
    }

    match no_show::retry_failed_captures(state, now).await {
        Ok(n) => report.captures_recovered = n,
        Err(e) => tracing::error!(error = %e, "error retrying no-show captures"),
    }

    if report != SweepReport::default() {
        tracing::info!(
            no_shows_charged = report.no_shows_charged,
            auto_released = report.auto_released,
            captures_recovered = report.captures_recovered,
            "sweep completed"
        );
    }
    report
}

/// Runs until the process exits.
pub async fn start_sweeper(state: Arc<AppState>) {
    let mut ticker = interval(state.config.sweep_interval());
    tracing::info!(interval_secs = state.config.sweep_interval().as_secs(), "starting sweeper");

    loop {
        ticker.tick().await;
        run_sweep(&state, Utc::now().naive_utc()).await;
    }
}
