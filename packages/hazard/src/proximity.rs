//! Route proximity filtering.

use commute_risk_geo::is_near_polyline;
use commute_risk_geo_models::Coordinate;
use commute_risk_hazard_models::HazardEvent;

use crate::HazardError;

/// Default distance from a route within which a hazard is considered to
/// affect it.
pub const DEFAULT_ROUTE_PROXIMITY_KM: f64 = 5.0;

/// Selects the events within `threshold_km` of any segment of the route
/// described by `waypoints`, preserving input order.
///
/// Segment proximity uses the ellipse approximation of
/// [`commute_risk_geo::is_near_route`]. An empty waypoint list matches no
/// events.
///
/// # Errors
///
/// Returns [`HazardError::InvalidThreshold`] if `threshold_km` is negative
/// or not finite.
pub fn filter_near_route<'a, I>(
    events: I,
    waypoints: &[Coordinate],
    threshold_km: f64,
) -> Result<Vec<&'a HazardEvent>, HazardError>
where
    I: IntoIterator<Item = &'a HazardEvent>,
{
    if !(threshold_km.is_finite() && threshold_km >= 0.0) {
        return Err(HazardError::InvalidThreshold(threshold_km));
    }

    let mut total = 0_usize;
    let near: Vec<_> = events
        .into_iter()
        .inspect(|_| total += 1)
        .filter(|event| is_near_polyline(&event.location, waypoints, threshold_km))
        .collect();

    log::trace!(
        "{} of {total} events within {threshold_km} km of a {}-point route",
        near.len(),
        waypoints.len()
    );

    Ok(near)
}
