//! Sliding-window send limiter for high-frequency broadcasts.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Rolling list of send timestamps for one vehicle.
///
/// Only position-update broadcasts are gated through this; all other
/// message kinds bypass the window entirely. A rejected send is dropped,
/// never queued: the next tick carries newer state anyway.
#[derive(Debug, Clone, Default)]
pub struct ThrottleWindow {
    sent: VecDeque<DateTime<Utc>>,
}

impl ThrottleWindow {
    /// Record a send at `now` if fewer than `max_per_window` sends happened
    /// within the trailing `window_ms`. Returns whether the send is allowed.
    pub fn try_send(&mut self, now: DateTime<Utc>, window_ms: i64, max_per_window: usize) -> bool {
        let cutoff = now - Duration::milliseconds(window_ms);
        while let Some(front) = self.sent.front() {
            if *front <= cutoff {
                self.sent.pop_front();
            } else {
                break;
            }
        }

        if self.sent.len() >= max_per_window {
            return false;
        }
        self.sent.push_back(now);
        true
    }
}
