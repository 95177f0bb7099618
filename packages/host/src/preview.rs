//! `GeoJSON` rendering of a decoded route for inspection.

use commute_risk_geo::{path_length_km, to_line_string};
use commute_risk_geo_models::Coordinate;
use commute_risk_polyline::{decode_with_header, sample_polyline_by_distance, simplify};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::json;

use crate::HostError;

fn feature(value: geojson::Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn properties(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

/// Decodes `encoded` and returns the route line plus its sampled
/// waypoints as a feature collection.
///
/// When `simplify_km` is set the line is simplified before sampling.
///
/// # Errors
///
/// * [`HostError::Decode`] if `encoded` is malformed
/// * [`HostError::Geometry`] if a tolerance or interval is invalid
pub fn route_preview(
    encoded: &str,
    simplify_km: Option<f64>,
    sample_km: f64,
) -> Result<FeatureCollection, HostError> {
    let (header, decoded) = decode_with_header(encoded)?;
    let line: Vec<Coordinate> = match simplify_km {
        Some(tolerance) => simplify(&decoded, tolerance)?,
        None => decoded.clone(),
    };
    let samples = sample_polyline_by_distance(&line, sample_km)?;

    log::debug!(
        "decoded {} points at precision {}, {} after simplification, {} samples",
        decoded.len(),
        header.precision,
        line.len(),
        samples.len()
    );

    let route = feature(
        geojson::Value::from(&to_line_string(&line)),
        properties(json!({
            "kind": "route",
            "precision": header.precision,
            "decodedPoints": decoded.len(),
            "points": line.len(),
            "lengthKm": path_length_km(&line),
        })),
    );
    let waypoints = feature(
        geojson::Value::MultiPoint(samples.iter().map(|c| vec![c.lng, c.lat]).collect()),
        properties(json!({
            "kind": "waypoints",
            "intervalKm": sample_km,
            "count": samples.len(),
        })),
    );

    Ok(FeatureCollection {
        bbox: None,
        features: vec![route, waypoints],
        foreign_members: None,
    })
}
