//! Per-vehicle off-route detection state machine.
//!
//! A vehicle is only declared off-route after a run of consecutive
//! out-of-tolerance evaluations, so single noisy GPS samples never trigger
//! an expensive recompute. Evaluations are debounced to a minimum interval.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Thresholds governing off-route detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OffRoutePolicy {
    /// Minimum interval between evaluations for one vehicle.
    pub debounce_ms: i64,
    /// Distance from the route polyline beyond which a sample counts as
    /// a strike.
    pub threshold_m: f64,
    /// Consecutive strikes required before a reroute is requested.
    pub strike_threshold: u32,
}

impl Default for OffRoutePolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            threshold_m: 50.0,
            strike_threshold: 3,
        }
    }
}

/// Outcome of one position evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffRouteDecision {
    /// Too soon since the last evaluation; sample ignored.
    Debounced,
    /// Within tolerance. Any accumulated strikes were cleared.
    OnRoute,
    /// Out of tolerance, but not yet enough consecutive strikes.
    Strike(u32),
    /// Strike threshold reached; the caller should recompute the route.
    /// The counter has been reset.
    RerouteNeeded,
}

/// Strike counter and debounce clock for one vehicle.
#[derive(Debug, Clone, Default)]
pub struct OffRouteTracker {
    strikes: u32,
    last_evaluated: Option<DateTime<Utc>>,
}

impl OffRouteTracker {
    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    /// Evaluate one distance sample against the policy.
    pub fn evaluate(
        &mut self,
        distance_m: f64,
        now: DateTime<Utc>,
        policy: &OffRoutePolicy,
    ) -> OffRouteDecision {
        if let Some(last) = self.last_evaluated {
            if now - last < Duration::milliseconds(policy.debounce_ms) {
                return OffRouteDecision::Debounced;
            }
        }
        self.last_evaluated = Some(now);

        if distance_m > policy.threshold_m {
            self.strikes += 1;
            if self.strikes >= policy.strike_threshold {
                self.strikes = 0;
                return OffRouteDecision::RerouteNeeded;
            }
            return OffRouteDecision::Strike(self.strikes);
        }

        if self.strikes != 0 {
            self.strikes = 0;
        }
        OffRouteDecision::OnRoute
    }
}
