//! Grid-bucket clustering of nearby hazard events.
//!
//! Events are projected into square cells of `grid_size_km` on a side,
//! converted to degrees with a fixed mid-latitude factor. Each unvisited
//! occupied cell then absorbs the events of its 3x3 neighbourhood that
//! have not already been claimed by an earlier group. Groups of one event
//! are returned as singles; larger groups become [`HazardCluster`]s.
//!
//! Bucketing and merging are each a single pass, so clustering is linear
//! in the number of events. Output order follows the order in which cells
//! were first seen in the input, which keeps results deterministic.

use std::collections::{HashMap, HashSet};

use commute_risk_geo_models::Coordinate;
use commute_risk_hazard_models::{HazardCluster, HazardEvent};

use crate::{HazardError, validate_event};

/// Default cluster cell size.
pub const DEFAULT_GRID_SIZE_KM: f64 = 2.0;

/// Degrees per kilometre used to size cells. Accurate enough at mid
/// latitudes; cells get narrower in real distance towards the poles.
pub const DEGREES_PER_KM: f64 = 0.018;

type CellKey = (i64, i64);

/// Result of a clustering pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clustering<'a> {
    /// Groups of two or more events.
    pub clusters: Vec<HazardCluster>,
    /// Events with no neighbour in their 3x3 cell block.
    pub singles: Vec<&'a HazardEvent>,
}

impl Clustering<'_> {
    /// Returns `true` if there are neither clusters nor singles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.singles.is_empty()
    }

    /// Total number of events accounted for by this clustering.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.clusters.iter().map(|c| c.count).sum::<usize>() + self.singles.len()
    }
}

/// Groups spatially close events.
///
/// Every input event ends up in exactly one cluster or exactly once among
/// the singles. Empty input yields an empty [`Clustering`].
///
/// # Errors
///
/// * [`HazardError::InvalidGridSize`] if `grid_size_km` is not a positive
///   finite number
/// * [`HazardError::InvalidEvent`] if any event has an invalid location or
///   confidence score
pub fn cluster_events<'a, I>(events: I, grid_size_km: f64) -> Result<Clustering<'a>, HazardError>
where
    I: IntoIterator<Item = &'a HazardEvent>,
{
    if !(grid_size_km.is_finite() && grid_size_km > 0.0) {
        return Err(HazardError::InvalidGridSize(grid_size_km));
    }
    let cell_size = grid_size_km * DEGREES_PER_KM;

    let mut buckets: HashMap<CellKey, Vec<&'a HazardEvent>> = HashMap::new();
    let mut order: Vec<CellKey> = Vec::new();
    for event in events {
        validate_event(event)?;
        let key = cell_key(&event.location, cell_size);
        buckets
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(event);
    }

    let mut visited: HashSet<CellKey> = HashSet::with_capacity(buckets.len());
    let mut clustering = Clustering::default();

    for key in order {
        if visited.contains(&key) {
            continue;
        }

        let mut group: Vec<&'a HazardEvent> = Vec::new();
        for d_lat in -1..=1 {
            for d_lng in -1..=1 {
                let neighbour = (key.0 + d_lat, key.1 + d_lng);
                if !visited.insert(neighbour) {
                    continue;
                }
                if let Some(members) = buckets.get(&neighbour) {
                    group.extend(members.iter().copied());
                }
            }
        }

        match group.as_slice() {
            [] => {}
            [single] => clustering.singles.push(*single),
            members => {
                if let Some(cluster) = build_cluster(key, members) {
                    clustering.clusters.push(cluster);
                }
            }
        }
    }

    log::debug!(
        "clustered {} events into {} clusters and {} singles",
        clustering.event_count(),
        clustering.clusters.len(),
        clustering.singles.len()
    );

    Ok(clustering)
}

#[allow(clippy::cast_possible_truncation)]
fn cell_key(location: &Coordinate, cell_size: f64) -> CellKey {
    (
        (location.lat / cell_size).floor() as i64,
        (location.lng / cell_size).floor() as i64,
    )
}

#[allow(clippy::cast_precision_loss)]
fn build_cluster(key: CellKey, members: &[&HazardEvent]) -> Option<HazardCluster> {
    let max_severity = members.iter().map(|e| e.severity).max()?;
    let max_confidence = members.iter().map(|e| e.confidence_score).max()?;

    let n = members.len() as f64;
    let (lat_sum, lng_sum) = members.iter().fold((0.0, 0.0), |(lat, lng), e| {
        (lat + e.location.lat, lng + e.location.lng)
    });

    Some(HazardCluster {
        id: format!("cluster:{}:{}", key.0, key.1),
        centroid: Coordinate {
            lat: lat_sum / n,
            lng: lng_sum / n,
        },
        count: members.len(),
        member_event_ids: members.iter().map(|e| e.id.clone()).collect(),
        max_severity,
        max_confidence,
    })
}
