//! Interval Scheduler
//!
//! Periodic rebuilds alongside HTTP triggers. Shares the rebuild lock with
//! the API, so a scheduled run waits for a triggered one instead of skipping.

use crate::state::AppState;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument};

/// Rebuild every `period` until the task is dropped.
#[instrument(skip(state))]
pub async fn run(state: AppState, period: Duration) {
    info!("Starting rebuild scheduler");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match state.run_queued().await {
            Ok(result) => info!(
                reason = %result.reason,
                round = result.round,
                "Scheduled rebuild finished"
            ),
            Err(e) => error!(kind = e.kind(), error = %e, "Scheduled rebuild failed"),
        }
    }
}
