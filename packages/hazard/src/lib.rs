#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard event aggregation.
//!
//! Raw hazard events arrive from weather, traffic and community
//! collaborators. Before scoring, the events relevant to a route are
//! selected with [`proximity::filter_near_route`] and grouped with
//! [`cluster::cluster_events`] so that ten reports of the same pile-up
//! count as one hazard cluster rather than ten hazards.

pub mod cluster;
pub mod proximity;
pub mod registry;

pub use cluster::{Clustering, DEFAULT_GRID_SIZE_KM, cluster_events};
pub use proximity::{DEFAULT_ROUTE_PROXIMITY_KM, filter_near_route};
pub use registry::{HazardRegistry, UpsertOutcome};

/// Errors from hazard aggregation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HazardError {
    /// Cluster grid size must be a positive, finite number of kilometres.
    #[error("grid size must be positive and finite, got {0} km")]
    InvalidGridSize(f64),

    /// Proximity threshold must be a non-negative, finite number of kilometres.
    #[error("proximity threshold must be non-negative and finite, got {0} km")]
    InvalidThreshold(f64),

    /// An event failed validation.
    #[error("invalid hazard event {id}: {reason}")]
    InvalidEvent {
        /// Id of the rejected event.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl HazardError {
    /// Hazard errors are always caused by bad input and never succeed on
    /// retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}

/// Checks the fields the core relies on: a valid location and a
/// confidence score within 0-100.
///
/// # Errors
///
/// Returns [`HazardError::InvalidEvent`] describing the first problem found.
pub fn validate_event(event: &commute_risk_hazard_models::HazardEvent) -> Result<(), HazardError> {
    if let Err(e) = event.location.validate() {
        return Err(HazardError::InvalidEvent {
            id: event.id.clone(),
            reason: e.to_string(),
        });
    }
    if event.confidence_score > 100 {
        return Err(HazardError::InvalidEvent {
            id: event.id.clone(),
            reason: format!(
                "confidence score {} exceeds 100",
                event.confidence_score
            ),
        });
    }
    Ok(())
}
