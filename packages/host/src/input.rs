//! JSON batch handed to the host each cycle by its collaborators.

use std::collections::BTreeMap;
use std::path::Path;

use commute_risk_hazard_models::HazardEvent;
use commute_risk_notify_models::AlertTrigger;
use commute_risk_risk_models::{ForecastPoint, RiskBreakdown};
use commute_risk_route_models::RouteRecord;
use serde::{Deserialize, Serialize};

use crate::HostError;

/// Forecast sub-scores for one departure slot.
///
/// When `event_score` is absent the route's current clustered hazard score
/// is used for the slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastInput {
    pub offset_minutes: i64,
    pub weather_score: f64,
    pub traffic_score: f64,
    #[serde(default)]
    pub event_score: Option<f64>,
}

impl ForecastInput {
    #[must_use]
    pub fn to_point(&self, current_event_score: f64) -> ForecastPoint {
        ForecastPoint {
            offset_minutes: self.offset_minutes,
            breakdown: RiskBreakdown::new(
                self.weather_score,
                self.traffic_score,
                self.event_score.unwrap_or(current_event_score),
            ),
        }
    }
}

/// A user-requested one-off alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeRequest {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub trigger: AlertTrigger,
}

/// Per-user notification preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    /// Minutes before the optimal departure to send the reminder, for
    /// routes that do not set their own.
    pub alert_advance_minutes: Option<i64>,
}

impl UserSettings {
    /// Fills preferences `record` leaves unset.
    pub fn apply_to(&self, record: &mut RouteRecord) {
        record.alert_advance_minutes = record.alert_advance_minutes.or(self.alert_advance_minutes);
    }
}

/// Everything one aggregation cycle needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchInput {
    /// Every current route. Routes with stored scheduling state that are
    /// missing here are treated as deleted.
    pub routes: Vec<RouteRecord>,
    /// Notification preferences keyed by user id.
    pub user_settings: BTreeMap<String, UserSettings>,
    /// Newly ingested or refreshed hazard events.
    pub events: Vec<HazardEvent>,
    /// Departure forecasts keyed by route id.
    pub forecasts: BTreeMap<String, Vec<ForecastInput>>,
    /// Scores persisted from the previous cycle, keyed by route id.
    pub previous_scores: BTreeMap<String, u8>,
    /// Routes whose settings were edited since the last cycle. Their
    /// pending reminders are rescheduled even if the time has not moved.
    pub invalidated_routes: Vec<String>,
    pub one_time_alerts: Vec<OneTimeRequest>,
}

impl BatchInput {
    /// # Errors
    ///
    /// * [`HostError::Io`] if the file cannot be read
    /// * [`HostError::Json`] if it is not a valid batch
    pub fn from_path(path: &Path) -> Result<Self, HostError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
