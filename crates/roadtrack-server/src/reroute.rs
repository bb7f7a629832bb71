//! Reactive rerouting coordinator.
//!
//! Position reports feed the off-route monitor; hazard and obstacle
//! reports are scanned against every active route polyline. Either trigger
//! replaces the affected vehicle's route and publishes change
//! notifications. Recomputation failure is non-destructive: the previous
//! route stays in place and observers still get the alert.

use chrono::Utc;
use roadtrack_core::geo::point_to_polyline_distance;
use roadtrack_core::models::{
    ActiveRoute, ClientMessage, Coordinate, CoordinateError, HazardKind, HazardReport,
    ObstacleReport, PositionReport, ReportedHazard, RerouteReason, ServerMessage, VehicleState,
};
use roadtrack_core::offroute::OffRouteDecision;

use crate::routing;
use crate::state::AppState;

/// Single entry point for tagged client messages, shared by the REST and
/// WebSocket surfaces.
pub async fn dispatch_client_message(
    state: &AppState,
    message: ClientMessage,
) -> Result<(), CoordinateError> {
    match message {
        ClientMessage::PositionReport(report) => {
            handle_position_report(state, report).await?;
        }
        ClientMessage::HazardReport(report) => {
            handle_hazard_report(state, report).await?;
        }
        ClientMessage::ObstacleReport(report) => {
            handle_obstacle_report(state, report).await?;
        }
    }
    Ok(())
}

/// Record a position report, broadcast it (throttled), and run the
/// off-route evaluation against the vehicle's active route.
pub async fn handle_position_report(
    state: &AppState,
    report: PositionReport,
) -> Result<VehicleState, CoordinateError> {
    Coordinate::new(report.lat, report.lon)?;

    let vehicle = state.update_position(&report);
    state.publish(ServerMessage::PositionUpdate { vehicle: vehicle.clone() });

    if let Some(route) = state.active_route(&report.vehicle_id) {
        let distance = point_to_polyline_distance(vehicle.position, &route.coordinates);
        let decision = state.evaluate_offroute(&report.vehicle_id, distance, Utc::now());
        match decision {
            OffRouteDecision::RerouteNeeded => {
                tracing::info!(
                    "vehicle {} drifted {:.0}m off route, recomputing",
                    report.vehicle_id,
                    distance
                );
                reroute_vehicle(
                    state,
                    &report.vehicle_id,
                    vehicle.position,
                    route.end,
                    RerouteReason::OffRoute,
                )
                .await;
            }
            OffRouteDecision::Strike(strikes) => {
                tracing::debug!(
                    "vehicle {} off route ({:.0}m), strike {}",
                    report.vehicle_id,
                    distance,
                    strikes
                );
            }
            OffRouteDecision::OnRoute | OffRouteDecision::Debounced => {}
        }
    }

    Ok(vehicle)
}

pub async fn handle_hazard_report(
    state: &AppState,
    report: HazardReport,
) -> Result<ReportedHazard, CoordinateError> {
    let location = Coordinate::new(report.lat, report.lon)?;
    let hazard = ReportedHazard {
        id: uuid::Uuid::new_v4().to_string(),
        kind: HazardKind::Hazard,
        location,
        severity: report.severity,
        radius_m: None,
        description: report.description,
        reported_at: Utc::now(),
    };
    ingest_hazard(state, hazard.clone()).await;
    Ok(hazard)
}

pub async fn handle_obstacle_report(
    state: &AppState,
    report: ObstacleReport,
) -> Result<ReportedHazard, CoordinateError> {
    let location = Coordinate::new(report.lat, report.lon)?;
    let hazard = ReportedHazard {
        id: uuid::Uuid::new_v4().to_string(),
        kind: HazardKind::Obstacle,
        location,
        severity: None,
        radius_m: report.radius_m,
        description: report.description,
        reported_at: Utc::now(),
    };
    ingest_hazard(state, hazard.clone()).await;
    Ok(hazard)
}

/// Recompute a vehicle's route and replace the active record. Publishes
/// both route notification shapes. Failure leaves the previous route.
pub async fn reroute_vehicle(
    state: &AppState,
    vehicle_id: &str,
    start: Coordinate,
    end: Coordinate,
    reason: RerouteReason,
) -> Option<ActiveRoute> {
    match routing::compute_route(state.router(), Some(vehicle_id.to_string()), start, end).await {
        Ok(mut route) => {
            route.recalculated = true;
            state.set_active_route(route.clone());
            publish_route_change(state, &route, reason);
            Some(route)
        }
        Err(err) => {
            tracing::warn!(
                "reroute for vehicle {} failed ({}), keeping previous route",
                vehicle_id,
                err
            );
            None
        }
    }
}

pub fn publish_route_change(state: &AppState, route: &ActiveRoute, reason: RerouteReason) {
    state.publish(ServerMessage::RouteUpdate {
        vehicle_id: route.vehicle_id.clone(),
        route: route.clone(),
        reason,
    });
    // Legacy shape, same payload; dropped once no old dashboards remain.
    state.publish(ServerMessage::RouteRecalculated {
        vehicle_id: route.vehicle_id.clone(),
        route: route.clone(),
    });
}

/// Register a hazard/obstacle and recompute every active route that passes
/// within its effect radius.
async fn ingest_hazard(state: &AppState, hazard: ReportedHazard) {
    state.insert_hazard(hazard.clone());

    let config = state.config();
    let radius = hazard.effective_radius_m(
        config.hazard_radius_m,
        config.default_obstacle_radius_m,
    );
    let reason = match hazard.kind {
        HazardKind::Hazard => RerouteReason::Hazard,
        HazardKind::Obstacle => RerouteReason::Obstacle,
    };

    for route in state.all_active_routes() {
        let Some(vehicle_id) = route.vehicle_id.clone() else {
            continue;
        };
        let distance = point_to_polyline_distance(hazard.location, &route.coordinates);
        if distance > radius {
            continue;
        }

        tracing::info!(
            "{:?} {} within {:.0}m of vehicle {} route, recomputing",
            hazard.kind,
            hazard.id,
            distance,
            vehicle_id
        );

        // Recompute from the route's original start/end pair.
        let new_route = reroute_vehicle(state, &vehicle_id, route.start, route.end, reason).await;
        state.publish(ServerMessage::ProximityAlert {
            vehicle_id,
            hazard: hazard.clone(),
            distance_m: distance,
            route: new_route,
        });
    }
}
