//! Periodic sweep expiring stale route-cache entries.
//!
//! `get` already treats stale entries as misses; the sweep just keeps the
//! map from holding dead weight between requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::state::AppState;

const CACHE_SWEEP_SECS: u64 = 30;

pub async fn run_cache_prune_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(Duration::from_secs(CACHE_SWEEP_SECS));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Cache prune loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let removed = state.router().cache().prune();
                if removed > 0 {
                    tracing::debug!("pruned {} stale route cache entries", removed);
                }
            }
        }
    }
}
