//! Periodic sweep expiring stale hazard and obstacle reports.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use roadtrack_core::models::ServerMessage;
use tokio::sync::broadcast;
use tokio::time::interval;

use crate::state::AppState;

const HAZARD_SWEEP_SECS: u64 = 60;

/// Start the hazard expiry loop. Reports older than the configured
/// maximum age are removed and announced to observers.
pub async fn run_hazard_expiry_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(Duration::from_secs(HAZARD_SWEEP_SECS));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Hazard expiry loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let max_age = ChronoDuration::hours(state.config().hazard_max_age_hours);
                let cutoff = Utc::now() - max_age;
                let expired = state.remove_hazards_older_than(cutoff);
                for hazard in expired {
                    tracing::info!("hazard {} expired after {}h", hazard.id, state.config().hazard_max_age_hours);
                    state.publish(ServerMessage::HazardExpired { hazard });
                }
            }
        }
    }
}
