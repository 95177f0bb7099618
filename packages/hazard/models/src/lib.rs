#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard event taxonomy and cluster types.
//!
//! Weather alerts, traffic incidents and community reports are all
//! normalized by their ingestion collaborators into [`HazardEvent`]
//! records. Provider-specific detail lives in the typed [`EventSource`]
//! payload; the untyped provider response is kept only as an opaque
//! [`RawPayload`] for audit and debugging.

use chrono::{DateTime, Utc};
use commute_risk_geo_models::Coordinate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How badly a hazard affects travel, on the 1-5 scale providers report.
///
/// On the wire a severity is its bare level number.
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
#[serde(try_from = "u8", into = "u8")]
#[strum(serialize_all = "snake_case")]
pub enum HazardSeverity {
    /// Drizzle, a short slowdown.
    Minimal = 1,
    /// Patchy fog, a single lane closed.
    Low = 2,
    /// Heavy rain, a crash causing delays.
    Moderate = 3,
    /// Snowstorm, a multi-vehicle pileup.
    High = 4,
    /// Ice storm, the road is shut.
    Critical = 5,
}

impl HazardSeverity {
    /// Every severity, mildest first.
    pub const LEVELS: [Self; 5] = [
        Self::Minimal,
        Self::Low,
        Self::Moderate,
        Self::High,
        Self::Critical,
    ];

    #[must_use]
    pub const fn level(self) -> u8 {
        self as u8
    }

    /// # Errors
    ///
    /// Returns [`SeverityError::OutOfRange`] unless `level` is 1 through 5.
    pub fn from_level(level: u8) -> Result<Self, SeverityError> {
        usize::from(level)
            .checked_sub(1)
            .and_then(|index| Self::LEVELS.get(index).copied())
            .ok_or(SeverityError::OutOfRange(level))
    }
}

impl TryFrom<u8> for HazardSeverity {
    type Error = SeverityError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(level)
    }
}

impl From<HazardSeverity> for u8 {
    fn from(severity: HazardSeverity) -> Self {
        severity.level()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeverityError {
    #[error("hazard severity {0} is outside 1-5")]
    OutOfRange(u8),
}

/// Broad hazard family.
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
pub enum HazardType {
    /// Weather conditions (rain, snow, fog, heat, wind).
    Weather,
    /// Traffic conditions (accidents, congestion, closures, roadworks).
    Traffic,
}

/// The untyped provider response an event was normalized from.
///
/// Kept for audit and debugging only. Nothing in the core reads it; use the
/// typed [`EventSource`] fields instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Option<serde_json::Value>);

impl RawPayload {
    /// Wraps a raw provider response.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(Some(value))
    }

    /// Returns the raw response for audit output.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        self.0.as_ref()
    }

    /// Returns `true` if no raw response was retained.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// Where an event came from, with the normalized provider-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventSource {
    /// A weather alert or observation from a weather provider.
    WeatherProvider {
        /// Provider identifier (e.g. `"nws"`).
        provider: String,
        /// Provider-side alert identifier, if any.
        #[serde(default, rename = "alertId")]
        alert_id: Option<String>,
    },
    /// An incident from a traffic provider.
    TrafficProvider {
        /// Provider identifier (e.g. `"tomtom"`).
        provider: String,
        /// Provider-side incident identifier, if any.
        #[serde(default, rename = "incidentId")]
        incident_id: Option<String>,
        /// Expected delay in minutes reported by the provider.
        #[serde(default, rename = "delayMinutes")]
        delay_minutes: Option<u32>,
    },
    /// A report submitted and voted on by users.
    Community {
        /// The submitting user.
        #[serde(rename = "reporterId")]
        reporter_id: String,
        /// Number of confirming votes.
        #[serde(default)]
        upvotes: u32,
        /// Number of disputing votes.
        #[serde(default)]
        downvotes: u32,
    },
}

impl EventSource {
    /// Short label used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::WeatherProvider { provider, .. } | Self::TrafficProvider { provider, .. } => {
                provider
            }
            Self::Community { .. } => "community",
        }
    }
}

/// A hazard affecting a location, normalized from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardEvent {
    /// Stable identifier; re-ingesting the same id refreshes the event.
    pub id: String,
    /// Weather or traffic.
    #[serde(rename = "type")]
    pub hazard_type: HazardType,
    /// Free-form subtype (e.g. `"flood"`, `"accident"`, `"roadwork"`).
    pub subtype: String,
    /// Where the hazard is.
    pub location: Coordinate,
    /// Severity level 1-5.
    pub severity: HazardSeverity,
    /// Confidence that the hazard is real, 0-100.
    pub confidence_score: u8,
    /// Typed source payload.
    pub source: EventSource,
    /// Instant after which the event is expired.
    pub ttl: DateTime<Utc>,
    /// Raw provider response, audit only.
    #[serde(default, skip_serializing_if = "RawPayload::is_empty")]
    pub raw: RawPayload,
}

impl HazardEvent {
    /// Returns `true` once `now` is past the event's ttl.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.ttl
    }
}

/// An aggregate of spatially close hazard events.
///
/// Recomputed every aggregation cycle and never persisted. The centroid is
/// a display/aggregation point and may not coincide with any event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardCluster {
    /// Identifier derived from the grid cell the cluster was seeded from.
    pub id: String,
    /// Unweighted mean of the member coordinates.
    pub centroid: Coordinate,
    /// Number of member events (always at least 2).
    pub count: usize,
    /// Ids of the member events.
    pub member_event_ids: Vec<String>,
    /// Highest member severity.
    pub max_severity: HazardSeverity,
    /// Highest member confidence, 0-100.
    pub max_confidence: u8,
}
