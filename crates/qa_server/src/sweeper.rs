use std::time::Duration;

use chrono::{DateTime, Utc};
use qa_core::expire_sessions;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info};

use crate::app_state::AppState;

/// Runs the expiry sweep now and then every `every`.
pub(crate) fn spawn_session_sweeper(
    state: AppState,
    every: Duration,
    retention: chrono::Duration,
) -> JoinHandle<()> {
    info!(
        interval_secs = every.as_secs(),
        retention_hours = retention.num_hours(),
        "session sweeper started"
    );
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            timer.tick().await;
            run_sweep(&state, Utc::now(), retention).await;
        }
    })
}

/// Removes expired sessions and drops their rooms. Failures are logged and
/// retried on the next tick.
pub(crate) async fn run_sweep(state: &AppState, now: DateTime<Utc>, retention: chrono::Duration) {
    match expire_sessions(&state.api, now, retention).await {
        Ok(expired) => {
            for slug in &expired.slugs {
                state.hub.close_room(slug).await;
            }
        }
        Err(error) => error!(%error, "session sweep failed"),
    }
}
