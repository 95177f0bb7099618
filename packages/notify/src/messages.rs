//! Alert title and body text.

use chrono::{DateTime, Utc};
use commute_risk_risk_models::DepartureRecommendation;
use commute_risk_route_models::Route;

/// Display name for a route, falling back to its endpoints.
#[must_use]
pub fn route_label(route: &Route) -> String {
    if route.name.trim().is_empty() {
        format!("{} to {}", route.from_location.name, route.to_location.name)
    } else {
        route.name.clone()
    }
}

fn local_clock(route: &Route, instant: DateTime<Utc>) -> String {
    route.local_time(instant).format("%H:%M").to_string()
}

#[must_use]
pub fn optimal_now(route: &Route, rec: &DepartureRecommendation) -> (String, String) {
    (
        format!("Good time to leave: {}", route_label(route)),
        format!(
            "{}. Current risk {} ({}).",
            rec.reason, rec.current_score, rec.current_classification
        ),
    )
}

#[must_use]
pub fn immediate(route: &Route, rec: &DepartureRecommendation) -> (String, String) {
    (
        format!("Leave soon: {}", route_label(route)),
        format!(
            "Best departure at {}. {}.",
            local_clock(route, rec.optimal_time),
            rec.reason
        ),
    )
}

#[must_use]
pub fn scheduled(route: &Route, rec: &DepartureRecommendation) -> (String, String) {
    (
        format!("Departure reminder: {}", route_label(route)),
        format!(
            "Leave at {} for the lowest risk ({}, {}). {}.",
            local_clock(route, rec.optimal_time),
            rec.optimal_score,
            rec.classification,
            rec.reason
        ),
    )
}
