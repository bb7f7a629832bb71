//! Core data models for the vehicle tracking system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A WGS84 point. Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("latitude must be a finite number")]
    LatitudeNotFinite,
    #[error("longitude must be a finite number")]
    LongitudeNotFinite,
    #[error("latitude out of range")]
    LatitudeOutOfRange,
    #[error("longitude out of range")]
    LongitudeOutOfRange,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        let coord = Self { lat, lon };
        coord.validate()?;
        Ok(coord)
    }

    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !self.lat.is_finite() {
            return Err(CoordinateError::LatitudeNotFinite);
        }
        if !self.lon.is_finite() {
            return Err(CoordinateError::LongitudeNotFinite);
        }
        if self.lat < -90.0 || self.lat > 90.0 {
            return Err(CoordinateError::LatitudeOutOfRange);
        }
        if self.lon < -180.0 || self.lon > 180.0 {
            return Err(CoordinateError::LongitudeOutOfRange);
        }
        Ok(())
    }
}

/// Position report received from a vehicle client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub vehicle_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PositionReport {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Current state of a tracked vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: String,
    pub position: Coordinate,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub last_update: DateTime<Utc>,
}

impl VehicleState {
    /// Create a new VehicleState from a first report.
    pub fn from_report(report: &PositionReport, now: DateTime<Utc>) -> Self {
        Self {
            vehicle_id: report.vehicle_id.clone(),
            position: report.coordinate(),
            heading_deg: report.heading_deg.unwrap_or(0.0),
            speed_mps: report.speed_mps.unwrap_or(0.0),
            last_update: report.timestamp.unwrap_or(now),
        }
    }

    /// Update state from a new report. Missing optional fields keep the
    /// previous value.
    pub fn update(&mut self, report: &PositionReport, now: DateTime<Utc>) {
        self.position = report.coordinate();
        if let Some(heading) = report.heading_deg {
            self.heading_deg = heading;
        }
        if let Some(speed) = report.speed_mps {
            self.speed_mps = speed;
        }
        self.last_update = report.timestamp.unwrap_or(now);
    }
}

/// One step of turn guidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInstruction {
    pub text: String,
    pub distance_m: f64,
    pub duration_ms: i64,
}

/// The route currently assigned to a vehicle.
///
/// A new computation fully replaces the prior record; there is no merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRoute {
    /// Routes computed ad hoc (no vehicle attached) leave this unset.
    pub vehicle_id: Option<String>,
    pub start: Coordinate,
    pub end: Coordinate,
    /// Ordered path coordinates, insertion order = travel order.
    pub coordinates: Vec<Coordinate>,
    pub distance_m: f64,
    /// Total duration including any provider-side traffic delay.
    pub duration_ms: i64,
    pub instructions: Vec<RouteInstruction>,
    /// True when the provider was bypassed and the route is estimated.
    pub fallback: bool,
    pub recalculated: bool,
    pub created_at: DateTime<Utc>,
}

/// Category of a reported road condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardKind {
    Hazard,
    Obstacle,
}

/// Inbound hazard report (accident, debris, flooding, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardReport {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Inbound obstacle report. Unlike hazards, obstacles carry their own
/// effect radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleReport {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub radius_m: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A hazard or obstacle accepted into the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedHazard {
    pub id: String,
    pub kind: HazardKind,
    pub location: Coordinate,
    pub severity: Option<String>,
    pub radius_m: Option<f64>,
    pub description: Option<String>,
    pub reported_at: DateTime<Utc>,
}

impl ReportedHazard {
    /// Radius within which active routes are considered affected.
    /// Hazards use the service-wide radius; obstacles use their own.
    pub fn effective_radius_m(&self, hazard_radius_m: f64, default_obstacle_radius_m: f64) -> f64 {
        match self.kind {
            HazardKind::Hazard => hazard_radius_m,
            HazardKind::Obstacle => self.radius_m.unwrap_or(default_obstacle_radius_m),
        }
    }
}

/// Messages accepted from clients over the stream (and mirrored by REST).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    PositionReport(PositionReport),
    HazardReport(HazardReport),
    ObstacleReport(ObstacleReport),
}

/// Why a route was recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerouteReason {
    OffRoute,
    Hazard,
    Obstacle,
    Requested,
}

/// Messages fanned out to connected observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// High-frequency per-vehicle position echo. The only throttled kind.
    PositionUpdate { vehicle: VehicleState },
    /// Route replacement notification.
    RouteUpdate {
        vehicle_id: Option<String>,
        route: ActiveRoute,
        reason: RerouteReason,
    },
    /// Legacy shape of the route replacement notification, kept for older
    /// dashboards. Deprecated; carries the same route as `RouteUpdate`.
    RouteRecalculated {
        vehicle_id: Option<String>,
        route: ActiveRoute,
    },
    /// A hazard or obstacle was detected near a vehicle's active route.
    ProximityAlert {
        vehicle_id: String,
        hazard: ReportedHazard,
        distance_m: f64,
        route: Option<ActiveRoute>,
    },
    HazardExpired { hazard: ReportedHazard },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_validation() {
        assert!(Coordinate::new(37.0, -122.0).is_ok());
        assert_eq!(
            Coordinate::new(123.456, -122.0),
            Err(CoordinateError::LatitudeOutOfRange)
        );
        assert_eq!(
            Coordinate::new(37.0, 181.0),
            Err(CoordinateError::LongitudeOutOfRange)
        );
        assert_eq!(
            Coordinate::new(f64::NAN, 0.0),
            Err(CoordinateError::LatitudeNotFinite)
        );
    }

    #[test]
    fn vehicle_state_keeps_last_known_motion_fields() {
        let now = Utc::now();
        let first = PositionReport {
            vehicle_id: "veh-1".to_string(),
            lat: 37.0,
            lon: -122.0,
            speed_mps: Some(12.0),
            heading_deg: Some(90.0),
            timestamp: None,
        };
        let mut state = VehicleState::from_report(&first, now);
        assert_eq!(state.speed_mps, 12.0);

        let second = PositionReport {
            vehicle_id: "veh-1".to_string(),
            lat: 37.001,
            lon: -122.0,
            speed_mps: None,
            heading_deg: None,
            timestamp: None,
        };
        state.update(&second, now);
        assert_eq!(state.position.lat, 37.001);
        assert_eq!(state.speed_mps, 12.0);
        assert_eq!(state.heading_deg, 90.0);
    }

    #[test]
    fn client_message_round_trips_tagged_json() {
        let json = r#"{"type":"position_report","vehicle_id":"veh-1","lat":37.0,"lon":-122.0}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::PositionReport(report) => assert_eq!(report.vehicle_id, "veh-1"),
            other => panic!("unexpected variant: {other:?}"),
        }

        let json = r#"{"type":"obstacle_report","lat":37.0,"lon":-122.0,"radius_m":250.0}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::ObstacleReport(_)));
    }

    #[test]
    fn obstacle_uses_own_radius_hazard_uses_global() {
        let now = Utc::now();
        let obstacle = ReportedHazard {
            id: "h1".to_string(),
            kind: HazardKind::Obstacle,
            location: Coordinate { lat: 37.0, lon: -122.0 },
            severity: None,
            radius_m: Some(250.0),
            description: None,
            reported_at: now,
        };
        assert_eq!(obstacle.effective_radius_m(1000.0, 100.0), 250.0);

        let hazard = ReportedHazard {
            kind: HazardKind::Hazard,
            radius_m: None,
            ..obstacle
        };
        assert_eq!(hazard.effective_radius_m(1000.0, 100.0), 1000.0);
    }
}
