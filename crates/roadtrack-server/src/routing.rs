//! Route resolution: provider-backed when possible, synthesized otherwise.
//!
//! The service must always produce *some* route. When the provider client
//! exhausts its budget, hits a terminal credential failure, or no credential
//! is configured at all, a straight-line estimate stands in, flagged
//! `fallback` so consumers can tell it apart from provider routing.

use chrono::Utc;
use roadtrack_core::geo::{bearing_deg, direction_name, haversine_distance, interpolate_line};
use roadtrack_core::models::{ActiveRoute, Coordinate, CoordinateError, RouteInstruction};

use crate::provider::RoutingClient;

const FALLBACK_STEPS: usize = 50;
const FALLBACK_SPEED_KMH: f64 = 50.0;

/// Compute a route, falling back to a straight-line estimate when the
/// provider is unusable. Coordinates are validated before any provider
/// call; invalid input is the only failure mode.
pub async fn compute_route(
    client: &RoutingClient,
    vehicle_id: Option<String>,
    start: Coordinate,
    end: Coordinate,
) -> Result<ActiveRoute, CoordinateError> {
    start.validate()?;
    end.validate()?;

    if !client.has_credential() {
        tracing::debug!("no provider credential configured, synthesizing route");
        return Ok(fallback_route(vehicle_id, start, end));
    }

    match client.fetch_route(start, end, true).await {
        Ok(route) => Ok(ActiveRoute {
            vehicle_id,
            start,
            end,
            coordinates: route.polyline,
            distance_m: route.distance_m,
            duration_ms: route.duration_ms,
            instructions: route.instructions,
            fallback: false,
            recalculated: false,
            created_at: Utc::now(),
        }),
        Err(err) => {
            tracing::warn!("provider routing failed ({}), using fallback route", err);
            Ok(fallback_route(vehicle_id, start, end))
        }
    }
}

/// Straight-line route estimate: 50 interpolated segments, haversine
/// distance, duration at a constant 50 km/h.
pub fn fallback_route(
    vehicle_id: Option<String>,
    start: Coordinate,
    end: Coordinate,
) -> ActiveRoute {
    let coordinates = interpolate_line(start, end, FALLBACK_STEPS);
    let distance_m = haversine_distance(start, end);
    let duration_ms = (distance_m / (FALLBACK_SPEED_KMH / 3.6) * 1_000.0) as i64;
    let heading = bearing_deg(start, end);

    let instructions = vec![
        RouteInstruction {
            text: format!("Head {}", direction_name(heading)),
            distance_m: distance_m / 2.0,
            duration_ms: duration_ms / 2,
        },
        RouteInstruction {
            text: "Continue straight".to_string(),
            distance_m: distance_m / 2.0,
            duration_ms: duration_ms / 2,
        },
        RouteInstruction {
            text: "Arrive at destination".to_string(),
            distance_m: 0.0,
            duration_ms: 0,
        },
    ];

    ActiveRoute {
        vehicle_id,
        start,
        end,
        coordinates,
        distance_m,
        duration_ms,
        instructions,
        fallback: true,
        recalculated: false,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_route_shape() {
        let start = Coordinate { lat: 37.7749, lon: -122.4194 };
        let end = Coordinate { lat: 37.7849, lon: -122.4094 };
        let route = fallback_route(Some("veh-1".to_string()), start, end);

        assert!(route.fallback);
        assert!(!route.recalculated);
        assert_eq!(route.coordinates.len(), 51);
        assert_eq!(route.coordinates[0], start);
        assert_eq!(route.coordinates[50], end);

        let expected = haversine_distance(start, end);
        assert!((route.distance_m - expected).abs() < 0.01);

        // ~1.4km at 50 km/h, about 102s.
        let expected_ms = (expected / (50.0 / 3.6) * 1_000.0) as i64;
        assert_eq!(route.duration_ms, expected_ms);

        assert_eq!(route.instructions.len(), 3);
        assert!(route.instructions[0].text.starts_with("Head "));
        assert_eq!(route.instructions[1].text, "Continue straight");
        assert_eq!(route.instructions[2].text, "Arrive at destination");
        assert_eq!(route.instructions[2].distance_m, 0.0);
        assert!((route.instructions[0].distance_m - expected / 2.0).abs() < 0.01);
    }

    #[test]
    fn fallback_heading_names_northeast() {
        let start = Coordinate { lat: 37.7749, lon: -122.4194 };
        let end = Coordinate { lat: 37.7849, lon: -122.4094 };
        let route = fallback_route(None, start, end);
        assert_eq!(route.instructions[0].text, "Head northeast");
        assert!(route.vehicle_id.is_none());
    }
}
