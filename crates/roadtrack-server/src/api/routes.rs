//! REST API routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::ws;
use crate::reroute;
use crate::state::AppState;
use roadtrack_core::models::{
    ActiveRoute, ClientMessage, Coordinate, PositionReport, RerouteReason, VehicleState,
};

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/v1/positions", post(receive_position))
        .route("/v1/reports", post(receive_report))
        .route("/v1/vehicles", get(list_vehicles))
        .route("/v1/vehicles/:vehicle_id", get(get_vehicle))
        .route("/v1/hazards", get(list_hazards))
        .route("/v1/routes", post(query_route))
        .route("/v1/routes/:vehicle_id", get(get_active_route))
        .route("/v1/ws", get(ws::ws_handler))
}

// === Request types ===

#[derive(Debug, Deserialize)]
pub struct RouteQueryRequest {
    /// Explicit origin. When absent, `vehicle_id`'s last known position
    /// is used instead.
    pub start: Option<Coordinate>,
    pub end: Coordinate,
    /// When set, the result becomes this vehicle's active route.
    pub vehicle_id: Option<String>,
}

// === Handlers ===

async fn health() -> &'static str {
    "OK"
}

/// Readiness: probes the routing provider between two fixed nearby points.
/// Mutates no vehicle or route state.
async fn ready(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    if !state.router().has_credential() {
        return Json(json!({
            "ready": true,
            "provider_reachable": false,
            "fallback_only": true,
        }));
    }

    let reachable = match state.router().probe().await {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!("provider probe failed: {}", err);
            false
        }
    };
    Json(json!({
        "ready": true,
        "provider_reachable": reachable,
        "fallback_only": false,
    }))
}

fn bad_request(message: &str, field: Option<&str>) -> (StatusCode, Json<serde_json::Value>) {
    let mut payload = json!({ "error": message });
    if let Some(field) = field {
        payload["field"] = serde_json::Value::String(field.to_string());
    }
    (StatusCode::BAD_REQUEST, Json(payload))
}

fn validate_position(report: &PositionReport) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    if !report.lat.is_finite() {
        return Err(bad_request("Latitude must be a finite number", Some("lat")));
    }
    if !report.lon.is_finite() {
        return Err(bad_request("Longitude must be a finite number", Some("lon")));
    }
    if report.lat < -90.0 || report.lat > 90.0 {
        return Err(bad_request("Latitude out of range", Some("lat")));
    }
    if report.lon < -180.0 || report.lon > 180.0 {
        return Err(bad_request("Longitude out of range", Some("lon")));
    }
    if report.vehicle_id.trim().is_empty() {
        return Err(bad_request("Vehicle id must not be empty", Some("vehicle_id")));
    }
    if let Some(heading) = report.heading_deg {
        if !heading.is_finite() || !(0.0..360.0).contains(&heading) {
            return Err(bad_request("Heading out of range", Some("heading_deg")));
        }
    }
    if let Some(speed) = report.speed_mps {
        if !speed.is_finite() || speed < 0.0 {
            return Err(bad_request("Speed out of allowed range", Some("speed_mps")));
        }
    }
    Ok(())
}

async fn receive_position(
    State(state): State<Arc<AppState>>,
    Json(report): Json<PositionReport>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(response) = validate_position(&report) {
        return response;
    }
    match reroute::handle_position_report(&state, report).await {
        Ok(_) => (StatusCode::ACCEPTED, Json(json!({}))),
        Err(err) => bad_request(&err.to_string(), None),
    }
}

/// Tagged report intake; same dispatch as the WebSocket stream.
async fn receive_report(
    State(state): State<Arc<AppState>>,
    Json(message): Json<ClientMessage>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let ClientMessage::PositionReport(ref report) = message {
        if let Err(response) = validate_position(report) {
            return response;
        }
    }
    match reroute::dispatch_client_message(&state, message).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({}))),
        Err(err) => bad_request(&err.to_string(), None),
    }
}

async fn list_vehicles(State(state): State<Arc<AppState>>) -> Json<Vec<VehicleState>> {
    Json(state.get_all_vehicles())
}

async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<VehicleState>, StatusCode> {
    state
        .get_vehicle(&vehicle_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn list_hazards(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<roadtrack_core::models::ReportedHazard>> {
    Json(state.get_hazards())
}

/// Synchronous route query. The origin is either explicit or resolved from
/// the vehicle's last known position; with neither, the request is
/// rejected.
async fn query_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteQueryRequest>,
) -> Result<Json<ActiveRoute>, (StatusCode, Json<serde_json::Value>)> {
    let start = match request.start {
        Some(start) => start,
        None => match request
            .vehicle_id
            .as_deref()
            .and_then(|id| state.get_vehicle(id))
        {
            Some(vehicle) => vehicle.position,
            None => {
                return Err(bad_request(
                    "Route query needs a start point or a vehicle with a known position",
                    Some("start"),
                ));
            }
        },
    };

    let route =
        crate::routing::compute_route(state.router(), request.vehicle_id.clone(), start, request.end)
            .await
            .map_err(|err| bad_request(&err.to_string(), None))?;

    if route.vehicle_id.is_some() {
        state.set_active_route(route.clone());
        reroute::publish_route_change(&state, &route, RerouteReason::Requested);
    }
    Ok(Json(route))
}

async fn get_active_route(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<ActiveRoute>, StatusCode> {
    state
        .active_route(&vehicle_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
