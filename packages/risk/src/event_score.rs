//! Event sub-score from clustered hazards.
//!
//! Each hazard group (a cluster or a single event) contributes points for
//! its worst severity, scaled by its best confidence. Clusters add a small
//! corroboration bonus per extra member, capped so a flood of duplicate
//! reports cannot dominate. The total is capped at 100.

use commute_risk_hazard::Clustering;
use commute_risk_hazard_models::HazardSeverity;
use commute_risk_risk_models::MAX_SCORE;

/// Bonus points per cluster member beyond the first.
const CORROBORATION_POINTS: f64 = 3.0;

/// Cluster members beyond the first that earn a corroboration bonus.
const MAX_CORROBORATING_MEMBERS: usize = 4;

const fn severity_points(severity: HazardSeverity) -> f64 {
    match severity {
        HazardSeverity::Minimal => 5.0,
        HazardSeverity::Low => 10.0,
        HazardSeverity::Moderate => 18.0,
        HazardSeverity::High => 28.0,
        HazardSeverity::Critical => 40.0,
    }
}

fn group_points(severity: HazardSeverity, confidence: u8) -> f64 {
    severity_points(severity) * f64::from(confidence) / 100.0
}

/// Converts clustered hazard events into a 0-100 event sub-score.
///
/// Never decreases when a group's severity or confidence rises or when a
/// group is added.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn event_score(clustering: &Clustering<'_>) -> f64 {
    let singles: f64 = clustering
        .singles
        .iter()
        .map(|event| group_points(event.severity, event.confidence_score))
        .sum();

    let clusters: f64 = clustering
        .clusters
        .iter()
        .map(|cluster| {
            let extra = cluster
                .count
                .saturating_sub(1)
                .min(MAX_CORROBORATING_MEMBERS);
            CORROBORATION_POINTS.mul_add(
                extra as f64,
                group_points(cluster.max_severity, cluster.max_confidence),
            )
        })
        .sum();

    (singles + clusters).min(f64::from(MAX_SCORE))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use commute_risk_geo_models::Coordinate;
    use commute_risk_hazard::cluster_events;
    use commute_risk_hazard_models::{EventSource, HazardEvent, HazardType, RawPayload};

    use super::*;

    fn event(id: &str, lat: f64, lng: f64, severity: u8, confidence: u8) -> HazardEvent {
        HazardEvent {
            id: id.to_string(),
            hazard_type: HazardType::Weather,
            subtype: "flood".to_string(),
            location: Coordinate { lat, lng },
            severity: HazardSeverity::from_level(severity).unwrap(),
            confidence_score: confidence,
            source: EventSource::WeatherProvider {
                provider: "nws".to_string(),
                alert_id: None,
            },
            ttl: Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
            raw: RawPayload::default(),
        }
    }

    #[test]
    fn empty_clustering_scores_zero() {
        assert!(event_score(&Clustering::default()).abs() < f64::EPSILON);
    }

    #[test]
    fn scores_singles_and_clusters() {
        let events = vec![
            event("a", 40.0, -73.0, 3, 100),
            event("b", 40.001, -73.001, 2, 50),
            event("c", 41.0, -74.0, 4, 50),
        ];
        let clustering = cluster_events(&events, 2.0).unwrap();

        // Cluster: 18 * 1.0 + 3 corroboration; single: 28 * 0.5.
        assert!((event_score(&clustering) - 35.0).abs() < 1e-9);
    }

    #[test]
    fn is_capped_at_one_hundred() {
        let events: Vec<_> = (0..10)
            .map(|i| event(&format!("e{i}"), 30.0 + f64::from(i), -100.0, 5, 100))
            .collect();
        let clustering = cluster_events(&events, 2.0).unwrap();
        assert!((event_score(&clustering) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn monotonic_in_severity_confidence_and_members() {
        let single_score = |severity, confidence| {
            let events = vec![event("a", 40.0, -73.0, severity, confidence)];
            event_score(&cluster_events(&events, 2.0).unwrap())
        };

        for severity in 1..5 {
            assert!(single_score(severity + 1, 100) > single_score(severity, 100));
        }
        for confidence in [0, 25, 50, 75] {
            assert!(single_score(3, confidence + 25) > single_score(3, confidence));
        }

        let one = vec![event("a", 40.0, -73.0, 3, 80)];
        let two = vec![event("a", 40.0, -73.0, 3, 80), event("b", 40.0, -73.0, 1, 10)];
        assert!(
            event_score(&cluster_events(&two, 2.0).unwrap())
                > event_score(&cluster_events(&one, 2.0).unwrap())
        );
    }
}
