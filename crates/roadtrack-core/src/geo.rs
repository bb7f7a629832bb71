//! Spatial math for route geometry and off-route distance checks.

use crate::models::Coordinate;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using the Haversine formula.
///
/// This is the standard formula for great-circle distance between two
/// points on a sphere given their latitudes and longitudes.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial compass bearing from `a` to `b` in degrees, [0, 360).
/// 0 = north, 90 = east.
pub fn bearing_deg(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let delta_lambda = (b.lon - a.lon).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y).to_degrees().rem_euclid(360.0)
}

/// Minimum distance in meters from a point to a polyline.
///
/// Each segment is projected on a locally flat (equirectangular) plane
/// centered on the segment midpoint's latitude; the projection parameter is
/// clamped to the segment, and the final distance back to the point is
/// haversine. An empty polyline yields `f64::INFINITY`.
pub fn point_to_polyline_distance(point: Coordinate, polyline: &[Coordinate]) -> f64 {
    match polyline {
        [] => f64::INFINITY,
        [only] => haversine_distance(point, *only),
        _ => polyline
            .windows(2)
            .map(|pair| distance_to_segment_m(point, pair[0], pair[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Distance in meters from `point` to the closest point on segment `a`-`b`.
pub fn distance_to_segment_m(point: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let mid_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let cos_lat = mid_lat.cos();

    // Local plane, meters, origin at `a`.
    let px = (point.lon - a.lon).to_radians() * cos_lat * EARTH_RADIUS_M;
    let py = (point.lat - a.lat).to_radians() * EARTH_RADIUS_M;
    let sx = (b.lon - a.lon).to_radians() * cos_lat * EARTH_RADIUS_M;
    let sy = (b.lat - a.lat).to_radians() * EARTH_RADIUS_M;

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 1e-9 {
        // Zero-length segment: the vertex is the closest point.
        return haversine_distance(point, a);
    }

    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let projected = Coordinate {
        lat: a.lat + t * (b.lat - a.lat),
        lon: a.lon + t * (b.lon - a.lon),
    };
    haversine_distance(point, projected)
}

/// Evenly spaced points from `a` to `b` inclusive, `steps + 1` points total.
pub fn interpolate_line(a: Coordinate, b: Coordinate, steps: usize) -> Vec<Coordinate> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            Coordinate {
                lat: a.lat + t * (b.lat - a.lat),
                lon: a.lon + t * (b.lon - a.lon),
            }
        })
        .collect()
}

const COMPASS_POINTS: [&str; 8] = [
    "north",
    "northeast",
    "east",
    "southeast",
    "south",
    "southwest",
    "west",
    "northwest",
];

/// Nearest of the 8 compass point names for a bearing in degrees.
pub fn direction_name(bearing: f64) -> &'static str {
    let index = (bearing.rem_euclid(360.0) / 45.0).round() as usize % 8;
    COMPASS_POINTS[index]
}
