//! In-memory state store using DashMap.
//!
//! One instance per process, constructed in `main` and shared via `Arc`.
//! Vehicle, route, off-route, and throttle registries are process-lifetime:
//! entries are created lazily on first relevant event and never evicted,
//! matching the service's scope (hazards do expire, via the sweep loop).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use roadtrack_core::models::{
    ActiveRoute, PositionReport, ReportedHazard, ServerMessage, VehicleState,
};
use roadtrack_core::offroute::{OffRouteDecision, OffRoutePolicy, OffRouteTracker};
use roadtrack_core::throttle::ThrottleWindow;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::provider::RoutingClient;

const BROADCAST_CHANNEL_CAPACITY: usize = 256;

pub struct AppState {
    config: Config,
    router: RoutingClient,
    vehicles: DashMap<String, VehicleState>,
    routes: DashMap<String, ActiveRoute>,
    offroute: DashMap<String, OffRouteTracker>,
    throttle: DashMap<String, ThrottleWindow>,
    hazards: DashMap<String, ReportedHazard>,
    /// Fan-out channel to connected observers.
    pub tx: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        let router = RoutingClient::new(&config);
        Self {
            config,
            router,
            vehicles: DashMap::new(),
            routes: DashMap::new(),
            offroute: DashMap::new(),
            throttle: DashMap::new(),
            hazards: DashMap::new(),
            tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &RoutingClient {
        &self.router
    }

    pub fn offroute_policy(&self) -> OffRoutePolicy {
        OffRoutePolicy {
            debounce_ms: self.config.offroute_debounce_ms,
            threshold_m: self.config.offroute_threshold_m,
            strike_threshold: self.config.offroute_strike_threshold,
        }
    }

    /// Update (or create) vehicle state from a position report.
    pub fn update_position(&self, report: &PositionReport) -> VehicleState {
        let now = Utc::now();
        let entry = self
            .vehicles
            .entry(report.vehicle_id.clone())
            .and_modify(|state| state.update(report, now))
            .or_insert_with(|| VehicleState::from_report(report, now));
        entry.value().clone()
    }

    pub fn get_vehicle(&self, vehicle_id: &str) -> Option<VehicleState> {
        self.vehicles.get(vehicle_id).map(|r| r.value().clone())
    }

    pub fn get_all_vehicles(&self) -> Vec<VehicleState> {
        self.vehicles.iter().map(|r| r.value().clone()).collect()
    }

    pub fn active_route(&self, vehicle_id: &str) -> Option<ActiveRoute> {
        self.routes.get(vehicle_id).map(|r| r.value().clone())
    }

    pub fn all_active_routes(&self) -> Vec<ActiveRoute> {
        self.routes.iter().map(|r| r.value().clone()).collect()
    }

    /// Replace a vehicle's active route. Last writer wins when two
    /// recomputes for the same vehicle race. Anonymous routes (no
    /// vehicle_id) are not registered.
    pub fn set_active_route(&self, route: ActiveRoute) {
        let Some(vehicle_id) = route.vehicle_id.clone() else {
            return;
        };
        // A fresh polyline invalidates accumulated strikes.
        self.offroute.remove(&vehicle_id);
        self.routes.insert(vehicle_id, route);
    }

    pub fn evaluate_offroute(
        &self,
        vehicle_id: &str,
        distance_m: f64,
        now: DateTime<Utc>,
    ) -> OffRouteDecision {
        let policy = self.offroute_policy();
        let mut tracker = self.offroute.entry(vehicle_id.to_string()).or_default();
        tracker.evaluate(distance_m, now, &policy)
    }

    pub fn insert_hazard(&self, hazard: ReportedHazard) {
        self.hazards.insert(hazard.id.clone(), hazard);
    }

    pub fn get_hazards(&self) -> Vec<ReportedHazard> {
        self.hazards.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove and return hazards reported before `cutoff`.
    pub fn remove_hazards_older_than(&self, cutoff: DateTime<Utc>) -> Vec<ReportedHazard> {
        let expired: Vec<ReportedHazard> = self
            .hazards
            .iter()
            .filter(|entry| entry.value().reported_at < cutoff)
            .map(|entry| entry.value().clone())
            .collect();
        for hazard in &expired {
            self.hazards.remove(&hazard.id);
        }
        expired
    }

    /// Publish a message to all observers. Position updates pass through
    /// the per-vehicle throttle window; every other kind is unthrottled.
    /// Send errors (no connected observers) are ignored.
    pub fn publish(&self, message: ServerMessage) {
        if let ServerMessage::PositionUpdate { vehicle } = &message {
            let now = Utc::now();
            let allowed = self
                .throttle
                .entry(vehicle.vehicle_id.clone())
                .or_default()
                .try_send(
                    now,
                    self.config.position_broadcast_window_ms,
                    self.config.position_broadcast_max_per_window,
                );
            if !allowed {
                return;
            }
        }
        let _ = self.tx.send(message);
    }
}
