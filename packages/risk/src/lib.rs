#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk scoring and departure optimization.
//!
//! Sub-scores for weather, traffic and hazard events (each normalized to
//! 0-100 by their collaborators, or by [`event_score`] for clustered
//! events) are combined by a [`RiskScorer`] into a single 0-100 score
//! and classified into low/medium/high. The [`optimizer`] ranks a
//! forecast of such breakdowns to pick the least risky departure slot.

pub mod event_score;
pub mod optimizer;
pub mod scorer;
pub mod snapshot;

pub use commute_risk_risk_models::RiskComponent;
pub use event_score::event_score;
pub use optimizer::optimize_departure;
pub use scorer::{RiskScorer, RiskWeights, classify};
pub use snapshot::SnapshotTracker;

/// Errors from risk scoring and departure optimization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    /// A sub-score was outside `0..=100` or not finite. Inputs are never
    /// clamped.
    #[error("{component} score must be within 0-100, got {value}")]
    InvalidInput {
        /// Which sub-score was rejected.
        component: RiskComponent,
        /// The rejected value.
        value: f64,
    },

    /// Weights must be finite, non-negative and sum to 1.
    #[error("invalid risk weights (weather {weather}, traffic {traffic}, event {event})")]
    InvalidWeights {
        weather: f64,
        traffic: f64,
        event: f64,
    },

    /// The forecast contained no points.
    #[error("no forecast data")]
    NoForecastData,

    /// The forecast had no point for the current time (offset 0).
    #[error("forecast has no current (offset 0) slot")]
    MissingCurrentSlot,

    /// Two forecast points had the same offset.
    #[error("duplicate forecast offset {0} minutes")]
    DuplicateOffset(i64),

    /// A forecast point was in the past.
    #[error("negative forecast offset {0} minutes")]
    NegativeOffset(i64),
}

impl RiskError {
    /// Risk errors describe bad input and never succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}
