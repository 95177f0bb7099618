#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk score types shared by the scorer, the departure optimizer and
//! the notification scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Highest score in the low band.
pub const LOW_MAX: u8 = 33;

/// Highest score in the medium band.
pub const MEDIUM_MAX: u8 = 66;

/// Highest possible score.
pub const MAX_SCORE: u8 = 100;

/// The three normalized sub-scores a composite score is built from, each
/// in `0.0..=100.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskBreakdown {
    /// Weather conditions along the route or at the location.
    pub weather_score: f64,
    /// Traffic conditions.
    pub traffic_score: f64,
    /// Clustered community and provider hazard events.
    pub event_score: f64,
}

impl RiskBreakdown {
    #[must_use]
    pub const fn new(weather_score: f64, traffic_score: f64, event_score: f64) -> Self {
        Self {
            weather_score,
            traffic_score,
            event_score,
        }
    }

    /// The sub-scores paired with their names, in a fixed order.
    #[must_use]
    pub const fn components(&self) -> [(RiskComponent, f64); 3] {
        [
            (RiskComponent::Weather, self.weather_score),
            (RiskComponent::Traffic, self.traffic_score),
            (RiskComponent::Event, self.event_score),
        ]
    }
}

/// Names one sub-score of a [`RiskBreakdown`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskComponent {
    Weather,
    Traffic,
    Event,
}

/// Risk band for a composite score.
///
/// Classification is a pure function of the score:
///
/// | Score | Class |
/// |-------|-------|
/// | 0-33 | Low |
/// | 34-66 | Medium |
/// | 67-100 | High |
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskClass {
    Low,
    Medium,
    High,
}

impl RiskClass {
    /// Maps a score to its band. Scores above 100 are treated as high.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            0..=LOW_MAX => Self::Low,
            34..=MEDIUM_MAX => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Direction of change between two consecutive cycles. Display only.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskTrend {
    Rising,
    Falling,
    Steady,
}

impl RiskTrend {
    /// Compares a score with the previous cycle's, if there was one.
    #[must_use]
    pub fn between(previous: Option<u8>, current: u8) -> Option<Self> {
        previous.map(|previous| match current.cmp(&previous) {
            std::cmp::Ordering::Greater => Self::Rising,
            std::cmp::Ordering::Less => Self::Falling,
            std::cmp::Ordering::Equal => Self::Steady,
        })
    }
}

/// One cycle's risk for a saved location or route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSnapshot {
    /// Id of the location or route this snapshot describes.
    pub subject_id: String,
    /// Composite score, 0-100.
    pub score: u8,
    /// The previous cycle's score, for trend display only.
    pub previous_score: Option<u8>,
    /// Band of `score`.
    pub classification: RiskClass,
    /// Sub-scores `score` was computed from.
    pub breakdown: RiskBreakdown,
    /// When the snapshot was computed.
    pub computed_at: DateTime<Utc>,
}

impl RiskSnapshot {
    #[must_use]
    pub fn trend(&self) -> Option<RiskTrend> {
        RiskTrend::between(self.previous_score, self.score)
    }
}

/// Forecast sub-scores for a departure `offset_minutes` from now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub offset_minutes: i64,
    pub breakdown: RiskBreakdown,
}

/// A scored forecast point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSlot {
    pub offset_minutes: i64,
    pub score: u8,
    pub classification: RiskClass,
    pub breakdown: RiskBreakdown,
}

/// The outcome of ranking a departure forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartureRecommendation {
    /// Minutes from now until the recommended departure.
    pub optimal_departure_minutes: i64,
    /// Wall-clock time of the recommended departure.
    pub optimal_time: DateTime<Utc>,
    /// `true` when leaving now is as good as any later slot.
    pub is_optimal_now: bool,
    /// Score of the current (offset 0) slot.
    pub current_score: u8,
    /// Band of the current slot.
    pub current_classification: RiskClass,
    /// Score of the recommended slot.
    pub optimal_score: u8,
    /// Band of the recommended slot.
    pub classification: RiskClass,
    /// Short summary of why the recommended slot was chosen.
    pub reason: String,
    /// Every scored slot, in offset order.
    pub forecast: Vec<ForecastSlot>,
}
