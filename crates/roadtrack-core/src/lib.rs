pub mod geo;
pub mod models;
pub mod offroute;
pub mod throttle;

pub use geo::{
    bearing_deg, direction_name, haversine_distance, interpolate_line,
    point_to_polyline_distance,
};
pub use models::{
    ActiveRoute, ClientMessage, Coordinate, HazardKind, HazardReport, ObstacleReport,
    PositionReport, ReportedHazard, RerouteReason, RouteInstruction, ServerMessage, VehicleState,
};
pub use offroute::{OffRouteDecision, OffRoutePolicy, OffRouteTracker};
pub use throttle::ThrottleWindow;
