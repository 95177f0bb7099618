//! Douglas-Peucker simplification.
//!
//! Deviation is measured in a flat latitude/longitude plane and converted
//! to kilometres with a fixed degrees-to-kilometres factor. No projection
//! is applied, so longitude distances are overstated away from the
//! equator; this is adequate at city and regional scale only.

use commute_risk_geo::KM_PER_DEGREE;
use commute_risk_geo_models::Coordinate;

use crate::GeometryError;

/// Default maximum deviation a dropped vertex may have from the simplified
/// line.
pub const DEFAULT_TOLERANCE_KM: f64 = 0.1;

/// Simplifies a polyline with the Douglas-Peucker algorithm.
///
/// For each span the vertex furthest from the chord between the span's
/// endpoints is kept (and both halves processed further) if its deviation
/// exceeds `tolerance_km`; otherwise the span collapses to its endpoints.
/// Ties keep the earliest vertex. Polylines of two or fewer points are
/// returned unchanged, and the first and last points are always kept.
///
/// The result is idempotent: simplifying an already simplified polyline
/// with the same tolerance returns it unchanged.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidTolerance`] if `tolerance_km` is
/// negative or not finite.
pub fn simplify(points: &[Coordinate], tolerance_km: f64) -> Result<Vec<Coordinate>, GeometryError> {
    if !(tolerance_km.is_finite() && tolerance_km >= 0.0) {
        return Err(GeometryError::InvalidTolerance(tolerance_km));
    }
    if points.len() <= 2 {
        return Ok(points.to_vec());
    }

    let tolerance = tolerance_km / KM_PER_DEGREE;
    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut spans = vec![(0, last)];
    while let Some((start, end)) = spans.pop() {
        if end - start < 2 {
            continue;
        }
        let (index, deviation) = furthest_from_chord(points, start, end);
        if deviation > tolerance {
            keep[index] = true;
            spans.push((start, index));
            spans.push((index, end));
        }
    }

    let simplified: Vec<Coordinate> = points
        .iter()
        .zip(keep)
        .filter_map(|(point, kept)| kept.then_some(*point))
        .collect();

    log::trace!(
        "simplified polyline from {} to {} points (tolerance {tolerance_km} km)",
        points.len(),
        simplified.len()
    );

    Ok(simplified)
}

/// Index and deviation (in degrees) of the interior vertex of
/// `start..=end` furthest from the chord `start -> end`.
fn furthest_from_chord(points: &[Coordinate], start: usize, end: usize) -> (usize, f64) {
    let (a, b) = (&points[start], &points[end]);
    let mut best = (start + 1, f64::NEG_INFINITY);
    for (offset, point) in points[start + 1..end].iter().enumerate() {
        let deviation = perpendicular_distance(point, a, b);
        if deviation > best.1 {
            best = (start + 1 + offset, deviation);
        }
    }
    best
}

/// Distance from `p` to the infinite line through `a` and `b` in the
/// lat/lng plane, falling back to the distance to `a` when the chord is a
/// single point.
fn perpendicular_distance(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> f64 {
    let dx = b.lng - a.lng;
    let dy = b.lat - a.lat;
    let chord = dx.hypot(dy);
    if chord == 0.0 {
        return (p.lng - a.lng).hypot(p.lat - a.lat);
    }
    (dy * p.lng - dx * p.lat + b.lng * a.lat - b.lat * a.lng).abs() / chord
}
