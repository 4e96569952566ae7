//! Sweeper service: background cleanup of expired timeouts.
//!
//! DESIGN
//! ======
//! Expiry is already enforced lazily on every timeout check, so this task
//! only bounds memory: it periodically drops records whose expiry has
//! passed. Missing a tick is harmless.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::event::now_ms;
use crate::state::AppState;

/// Spawn the sweep loop. Returns `None` when the interval is configured as 0.
#[must_use]
pub fn spawn_timeout_sweep_task(state: AppState) -> Option<JoinHandle<()>> {
    let interval_secs = state.config.sweep_interval_secs;
    if interval_secs == 0 {
        info!("timeout sweep disabled");
        return None;
    }
    info!(interval_secs, "timeout sweep configured");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            sweep_once_at(&state, now_ms()).await;
        }
    }))
}

/// Remove every timeout expired by `now`. Returns how many were removed.
pub async fn sweep_once_at(state: &AppState, now: i64) -> usize {
    let mut room = state.room.write().await;
    if room.moderation.is_empty() {
        return 0;
    }
    let removed = room.moderation.sweep_expired_at(now);
    if removed > 0 {
        info!(removed, remaining = room.moderation.len(), "expired timeouts swept");
    } else {
        debug!(active = room.moderation.len(), "timeout sweep found nothing");
    }
    removed
}

#[cfg(test)]
#[path = "sweeper_test.rs"]
mod tests;
