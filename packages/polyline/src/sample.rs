//! Distance-based resampling of long routes.

use commute_risk_geo::distance_km;
use commute_risk_geo_models::Coordinate;

use crate::GeometryError;

/// Spacing between weather-lookup waypoints on long routes.
pub const DEFAULT_SAMPLE_INTERVAL_KM: f64 = 50.0;

/// Fraction of a segment below which an interpolated sample snaps onto the
/// segment's end vertex.
const SNAP_EPSILON: f64 = 1e-12;

/// Walks the polyline and emits a point every `interval_km` of travelled
/// distance, linearly interpolated in latitude/longitude on the segment
/// where the interval is crossed.
///
/// The first and last original points are always included. Zero-length
/// segments are skipped.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidInterval`] if `interval_km` is not a
/// positive finite number.
pub fn sample_polyline_by_distance(
    points: &[Coordinate],
    interval_km: f64,
) -> Result<Vec<Coordinate>, GeometryError> {
    if !(interval_km.is_finite() && interval_km > 0.0) {
        return Err(GeometryError::InvalidInterval(interval_km));
    }

    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Ok(Vec::new());
    };

    let mut sampled = vec![*first];
    let mut since_last_sample = 0.0;

    for segment in points.windows(2) {
        let (a, b) = (&segment[0], &segment[1]);
        let length = distance_km(a, b);
        if length <= 0.0 {
            continue;
        }

        let mut travelled = 0.0;
        while since_last_sample + (length - travelled) >= interval_km {
            travelled += interval_km - since_last_sample;
            let mut t = travelled / length;
            if 1.0 - t < SNAP_EPSILON {
                t = 1.0;
            }
            sampled.push(a.lerp(b, t));
            since_last_sample = 0.0;
        }
        since_last_sample += length - travelled;
    }

    if points.len() > 1 && (sampled.len() == 1 || sampled.last() != Some(last)) {
        sampled.push(*last);
    }

    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn c(lat: f64, lng: f64) -> Coordinate {
        Coordinate { lat, lng }
    }

    #[test]
    fn empty_and_single_point() {
        assert!(sample_polyline_by_distance(&[], 50.0).unwrap().is_empty());
        assert_eq!(
            sample_polyline_by_distance(&[c(1.0, 2.0)], 50.0).unwrap(),
            vec![c(1.0, 2.0)]
        );
    }

    #[test]
    fn samples_every_interval_on_a_single_segment() {
        // ~111.2 km along the equator.
        let points = [c(0.0, 0.0), c(0.0, 1.0)];
        let sampled = sample_polyline_by_distance(&points, 50.0).unwrap();
        assert_eq!(sampled.len(), 4);
        assert_eq!(sampled[0], points[0]);
        assert_eq!(sampled[3], points[1]);
        assert!((distance_km(&points[0], &sampled[1]) - 50.0).abs() < 1e-6);
        assert!((distance_km(&points[0], &sampled[2]) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn carries_distance_across_segments() {
        let points = [c(0.0, 0.0), c(0.0, 0.3), c(0.0, 0.6), c(0.0, 0.9)];
        let sampled = sample_polyline_by_distance(&points, 50.0).unwrap();
        assert_eq!(sampled.len(), 4);
        assert!((distance_km(&points[0], &sampled[1]) - 50.0).abs() < 1e-6);
        assert!((distance_km(&points[0], &sampled[2]) - 100.0).abs() < 1e-6);
        assert_eq!(sampled.last(), points.last());
    }

    #[test]
    fn short_route_keeps_only_endpoints() {
        let points = [c(40.0, -74.0), c(40.01, -74.01), c(40.02, -74.0)];
        let sampled = sample_polyline_by_distance(&points, 50.0).unwrap();
        assert_eq!(sampled, vec![points[0], points[2]]);
    }

    #[test]
    fn closed_loop_keeps_both_endpoints() {
        let points = [c(40.0, -74.0), c(40.01, -74.0), c(40.0, -74.0)];
        let sampled = sample_polyline_by_distance(&points, 50.0).unwrap();
        assert_eq!(sampled, vec![points[0], points[2]]);
    }

    #[test]
    fn skips_zero_length_segments() {
        let points = [c(0.0, 0.0), c(0.0, 0.0), c(0.0, 1.0)];
        let sampled = sample_polyline_by_distance(&points, 50.0).unwrap();
        assert_eq!(sampled.len(), 4);
    }

    #[test]
    fn rejects_non_positive_interval() {
        let points = [c(0.0, 0.0), c(0.0, 1.0)];
        assert!(sample_polyline_by_distance(&points, 0.0).is_err());
        assert!(sample_polyline_by_distance(&points, -5.0).is_err());
        assert!(sample_polyline_by_distance(&points, f64::NAN).is_err());
    }
}
