#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometric primitives for route and hazard geometry.
//!
//! All functions are pure and deterministic. Distances are great-circle
//! (haversine) kilometres; proximity tests are deliberately approximate
//! and tuned for city/regional commute distances.

use commute_risk_geo_models::{BoundingBox, Coordinate};

/// Mean earth radius in kilometres (IUGG / GRS80 mean radius).
pub const EARTH_RADIUS_KM: f64 = 6_371.008_8;

/// Kilometres spanned by one degree of latitude, used for flat-plane
/// approximations.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Great-circle distance between two coordinates in kilometres.
///
/// Uses the haversine formula with the intermediate term clamped to
/// `0..=1` and the `atan2` form of the central angle, which stays stable
/// for both coincident and antipodal points.
#[must_use]
pub fn distance_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (d_lat.abs() / 2.0).sin();
    let sin_lng = (d_lng.abs() / 2.0).sin();
    let h = (lat1.cos() * lat2.cos())
        .mul_add(sin_lng * sin_lng, sin_lat * sin_lat)
        .clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Total length of a path in kilometres.
#[must_use]
pub fn path_length_km(points: &[Coordinate]) -> f64 {
    points.windows(2).map(|w| distance_km(&w[0], &w[1])).sum()
}

/// Returns `true` if `point` lies within roughly `threshold_km` of the
/// segment from `route_start` to `route_end`.
///
/// This is an ellipse approximation rather than an exact point-to-segment
/// distance: a point passes if it is within the threshold of either
/// endpoint, or if it lies inside the threshold-expanded bounding box of
/// the segment and the detour `(d_start + d_end) - length` is at most
/// `2 * threshold_km`. The ellipse is wider than the true corridor near
/// the middle of long segments; downstream thresholds are tuned against
/// this behavior.
#[must_use]
pub fn is_near_route(
    point: &Coordinate,
    route_start: &Coordinate,
    route_end: &Coordinate,
    threshold_km: f64,
) -> bool {
    let to_start = distance_km(point, route_start);
    let to_end = distance_km(point, route_end);
    if to_start <= threshold_km || to_end <= threshold_km {
        return true;
    }

    let bbox = BoundingBox::from_corners(route_start, route_end);
    let (lat_margin, lng_margin) = degree_margins(threshold_km, bbox.south, bbox.north);
    if !bbox.expand(lat_margin, lng_margin).contains(point) {
        return false;
    }

    let route_length = distance_km(route_start, route_end);
    (to_start + to_end) - route_length <= 2.0 * threshold_km
}

/// Applies [`is_near_route`] to every consecutive pair of `waypoints`.
///
/// A single waypoint degenerates to a radius test; an empty path is
/// never near anything.
#[must_use]
pub fn is_near_polyline(point: &Coordinate, waypoints: &[Coordinate], threshold_km: f64) -> bool {
    match waypoints {
        [] => false,
        [only] => distance_km(point, only) <= threshold_km,
        _ => waypoints
            .windows(2)
            .any(|w| is_near_route(point, &w[0], &w[1], threshold_km)),
    }
}

/// Converts a kilometre distance into latitude/longitude degree margins
/// for a band spanning `south..=north`.
///
/// The longitude margin uses the latitude furthest from the equator, so
/// the margin is never too small. Near the poles it widens to the whole
/// globe.
fn degree_margins(km: f64, south: f64, north: f64) -> (f64, f64) {
    let lat_margin = km / KM_PER_DEGREE;
    let widest = south.abs().max(north.abs()).min(90.0).to_radians().cos();
    let lng_margin = if widest <= f64::EPSILON {
        360.0
    } else {
        km / (KM_PER_DEGREE * widest)
    };
    (lat_margin, lng_margin)
}

/// Converts a coordinate into a `geo` point (`x` = longitude).
#[must_use]
pub fn to_point(c: &Coordinate) -> geo::Point<f64> {
    geo::Point::new(c.lng, c.lat)
}

/// Converts a path into a `geo` line string for map output.
#[must_use]
pub fn to_line_string(points: &[Coordinate]) -> geo::LineString<f64> {
    points
        .iter()
        .map(|c| geo::Coord { x: c.lng, y: c.lat })
        .collect()
}
