//! Per-route evaluation.
//!
//! Each route goes through the same pure pipeline: decode and simplify
//! its geometry, select and cluster the hazards near it, score the
//! clustered hazards, then rank its departure forecast. Routes are
//! independent, so [`evaluate_routes`] fans them out across blocking
//! worker tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use commute_risk_geo_models::Coordinate;
use commute_risk_hazard::{cluster_events, filter_near_route};
use commute_risk_hazard_models::{HazardCluster, HazardEvent};
use commute_risk_polyline::{decode, sample_polyline_by_distance, simplify};
use commute_risk_risk::{RiskError, RiskScorer, event_score, optimize_departure};
use commute_risk_risk_models::{DepartureRecommendation, ForecastPoint, RiskBreakdown};
use commute_risk_route_models::{Route, RouteRecord};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::PipelineError;
use crate::config::HostConfig;
use crate::input::ForecastInput;

/// Decodes and simplifies a route record's geometry.
///
/// Records without an encoded polyline use the straight segment between
/// their endpoints.
///
/// # Errors
///
/// Returns [`PipelineError`] if the polyline is malformed, an endpoint is
/// invalid, or the route fails validation.
pub fn prepare_route(record: RouteRecord, config: &HostConfig) -> Result<Route, PipelineError> {
    record.from_location.coordinate.validate()?;
    record.to_location.coordinate.validate()?;

    let raw = match &record.encoded_polyline {
        Some(encoded) => decode(encoded)?,
        None => vec![
            record.from_location.coordinate,
            record.to_location.coordinate,
        ],
    };
    let polyline = simplify(&raw, config.simplify_tolerance_km)?;
    log::debug!(
        "route {}: {} decoded points simplified to {}",
        record.id,
        raw.len(),
        polyline.len()
    );

    let route = record.into_route(polyline);
    route.validate()?;
    Ok(route)
}

/// Everything computed for one route in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEvaluation {
    pub route_id: String,
    /// Evenly spaced weather-lookup points along the route.
    pub waypoints: Vec<Coordinate>,
    pub nearby_event_ids: Vec<String>,
    pub clusters: Vec<HazardCluster>,
    pub event_score: f64,
    /// Breakdown of the current (offset 0) slot.
    pub current: RiskBreakdown,
    pub recommendation: DepartureRecommendation,
}

/// Runs the scoring pipeline for one route.
///
/// Hazard proximity is tested against the simplified route geometry, not
/// the sampled waypoints, so short urban routes keep their shape.
///
/// # Errors
///
/// Returns [`PipelineError`] if sampling, clustering or optimization fails,
/// including [`RiskError::NoForecastData`] when `forecast` is empty.
pub fn evaluate_route(
    route: &Route,
    events: &[HazardEvent],
    forecast: &[ForecastInput],
    scorer: &RiskScorer,
    config: &HostConfig,
    now: DateTime<Utc>,
) -> Result<RouteEvaluation, PipelineError> {
    let waypoints = sample_polyline_by_distance(&route.polyline, config.sample_interval_km)?;

    let nearby = filter_near_route(events, &route.polyline, config.route_proximity_km)?;
    let clustering = cluster_events(nearby.iter().copied(), config.cluster_grid_km)?;
    let event_score = event_score(&clustering);

    let points: Vec<ForecastPoint> = forecast.iter().map(|f| f.to_point(event_score)).collect();
    let recommendation = optimize_departure(scorer, &points, now)?;
    let current = recommendation
        .forecast
        .first()
        .map(|slot| slot.breakdown)
        .ok_or(RiskError::MissingCurrentSlot)?;

    log::debug!(
        "route {}: {} nearby events in {} clusters, event score {event_score:.1}, current {} optimal +{} min",
        route.id,
        nearby.len(),
        clustering.clusters.len(),
        recommendation.current_score,
        recommendation.optimal_departure_minutes
    );

    Ok(RouteEvaluation {
        route_id: route.id.clone(),
        waypoints,
        nearby_event_ids: nearby.iter().map(|e| e.id.clone()).collect(),
        clusters: clustering.clusters,
        event_score,
        current,
        recommendation,
    })
}

/// Evaluates every route on the blocking thread pool and returns the
/// results keyed by route id.
///
/// A failure in one route never affects the others. A panicking worker is
/// reported as [`PipelineError::Worker`] for its route.
pub async fn evaluate_routes(
    routes: &[Route],
    events: Arc<[HazardEvent]>,
    forecasts: &BTreeMap<String, Vec<ForecastInput>>,
    scorer: RiskScorer,
    config: Arc<HostConfig>,
    now: DateTime<Utc>,
) -> BTreeMap<String, Result<RouteEvaluation, PipelineError>> {
    let mut tasks = JoinSet::new();

    for route in routes {
        let route = route.clone();
        let events = Arc::clone(&events);
        let forecast = forecasts.get(&route.id).cloned().unwrap_or_default();
        let config = Arc::clone(&config);
        tasks.spawn_blocking(move || {
            let result = evaluate_route(&route, &events, &forecast, &scorer, &config, now);
            (route.id, result)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((route_id, result)) => {
                if let Err(e) = &result {
                    log::warn!("route {route_id}: evaluation failed: {e}");
                }
                results.insert(route_id, result);
            }
            Err(e) => log::error!("route evaluation worker failed: {e}"),
        }
    }

    // Routes whose worker died have no entry yet.
    for route in routes {
        results
            .entry(route.id.clone())
            .or_insert_with(|| Err(PipelineError::Worker(route.id.clone())));
    }

    results
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use commute_risk_hazard_models::{EventSource, HazardSeverity, HazardType, RawPayload};
    use commute_risk_polyline::DecodeError;
    use commute_risk_route_models::{Location, MonitorDays};

    use super::*;

    const REFERENCE_POLYLINE: &str = "BFoz5xJ67i1B1B7PzIhaxL7Y";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 7, 7, 0, 0).unwrap()
    }

    fn record(id: &str, encoded: Option<&str>) -> RouteRecord {
        RouteRecord {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            name: "Frankfurt".to_string(),
            from_location: Location {
                name: "Home".to_string(),
                coordinate: Coordinate {
                    lat: 50.10228,
                    lng: 8.69821,
                },
            },
            to_location: Location {
                name: "Work".to_string(),
                coordinate: Coordinate {
                    lat: 50.09878,
                    lng: 8.68752,
                },
            },
            encoded_polyline: encoded.map(str::to_string),
            monitor_days: MonitorDays::ALL,
            alert_time: None,
            alert_advance_minutes: None,
            is_active: true,
            utc_offset_minutes: 0,
        }
    }

    fn event(id: &str, lat: f64, lng: f64) -> HazardEvent {
        HazardEvent {
            id: id.to_string(),
            hazard_type: HazardType::Traffic,
            subtype: "accident".to_string(),
            location: Coordinate { lat, lng },
            severity: HazardSeverity::High,
            confidence_score: 100,
            source: EventSource::TrafficProvider {
                provider: "tomtom".to_string(),
                incident_id: None,
                delay_minutes: Some(10),
            },
            ttl: now() + chrono::Duration::hours(2),
            raw: RawPayload::default(),
        }
    }

    fn forecast(scores: &[(i64, f64)]) -> Vec<ForecastInput> {
        scores
            .iter()
            .map(|&(offset_minutes, score)| ForecastInput {
                offset_minutes,
                weather_score: score,
                traffic_score: score,
                event_score: None,
            })
            .collect()
    }

    #[test]
    fn prepares_decoded_and_straight_routes() {
        let config = HostConfig::default();
        let decoded = prepare_route(record("a", Some(REFERENCE_POLYLINE)), &config).unwrap();
        assert!((decoded.polyline.first().unwrap().lat - 50.10228).abs() < 1e-9);
        assert!((decoded.polyline.last().unwrap().lng - 8.68752).abs() < 1e-9);

        let straight = prepare_route(record("b", None), &config).unwrap();
        assert_eq!(straight.polyline.len(), 2);
    }

    #[test]
    fn malformed_polyline_is_reported() {
        let err = prepare_route(record("a", Some("BFoz5xJ67i1B1B7PzIhaxL7")), &HostConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Decode(DecodeError::Truncated { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn nearby_hazards_feed_the_event_score() {
        let config = HostConfig::default();
        let route = prepare_route(record("a", Some(REFERENCE_POLYLINE)), &config).unwrap();
        let events = vec![
            event("near-1", 50.1005, 8.6935),
            event("near-2", 50.1006, 8.6936),
            event("far", 48.85, 2.35),
        ];

        let evaluation = evaluate_route(
            &route,
            &events,
            &forecast(&[(0, 50.0), (15, 20.0)]),
            &RiskScorer::default(),
            &config,
            now(),
        )
        .unwrap();

        assert_eq!(evaluation.nearby_event_ids, vec!["near-1", "near-2"]);
        assert_eq!(evaluation.clusters.len(), 1);
        // One high-severity cluster at full confidence plus one corroborating report.
        assert!((evaluation.event_score - 31.0).abs() < 1e-9);
        assert!((evaluation.current.event_score - 31.0).abs() < 1e-9);
        assert_eq!(evaluation.recommendation.optimal_departure_minutes, 15);
    }

    #[test]
    fn missing_forecast_is_an_error() {
        let config = HostConfig::default();
        let route = prepare_route(record("a", None), &config).unwrap();
        let err = evaluate_route(&route, &[], &[], &RiskScorer::default(), &config, now())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Risk(RiskError::NoForecastData)));
    }

    #[tokio::test]
    async fn fans_out_and_isolates_failures() {
        let config = HostConfig::default();
        let routes = vec![
            prepare_route(record("a", Some(REFERENCE_POLYLINE)), &config).unwrap(),
            prepare_route(record("b", None), &config).unwrap(),
        ];
        let mut forecasts = BTreeMap::new();
        forecasts.insert("a".to_string(), forecast(&[(0, 30.0)]));

        let results = evaluate_routes(
            &routes,
            Arc::from(Vec::new()),
            &forecasts,
            RiskScorer::default(),
            Arc::new(config),
            now(),
        )
        .await;

        assert_eq!(results.len(), 2);
        assert!(results["a"].is_ok());
        assert!(matches!(
            results["b"],
            Err(PipelineError::Risk(RiskError::NoForecastData))
        ));
    }
}
