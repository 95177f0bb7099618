#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Monitored commute routes.
//!
//! A [`RouteRecord`] is what the persistence collaborator hands over: the
//! provider's encoded polyline plus the user's monitoring preferences. Once
//! the polyline is decoded it becomes a [`Route`], whose geometry is not
//! touched again unless the provider geometry changes.

use chrono::{DateTime, Datelike as _, FixedOffset, NaiveDate, NaiveTime, Offset as _, Utc};
use commute_risk_geo_models::Coordinate;
use serde::{Deserialize, Serialize};

/// Largest UTC offset accepted for a route's local time, in minutes.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Largest reminder lead time accepted for a route, in minutes.
pub const MAX_ALERT_ADVANCE_MINUTES: i64 = 24 * 60;

/// Errors from route validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route {id}: utc offset {minutes} minutes is out of range")]
    InvalidUtcOffset { id: String, minutes: i32 },

    #[error("route {id}: alert advance of {minutes} minutes is out of range")]
    InvalidAlertAdvance { id: String, minutes: i64 },
}

/// A named endpoint of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    pub coordinate: Coordinate,
}

/// Days of the week a route is monitored, indexed Sunday = 0 through
/// Saturday = 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorDays(pub [bool; 7]);

impl Default for MonitorDays {
    fn default() -> Self {
        Self::WEEKDAYS
    }
}

impl MonitorDays {
    /// Monday through Friday.
    pub const WEEKDAYS: Self = Self([false, true, true, true, true, true, false]);

    /// Every day.
    pub const ALL: Self = Self([true; 7]);

    /// Returns `true` if `date` falls on a monitored weekday.
    #[must_use]
    pub fn includes(&self, date: NaiveDate) -> bool {
        self.0[date.weekday().num_days_from_sunday() as usize]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.0.contains(&true)
    }
}

/// Route as delivered by the persistence collaborator, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    pub from_location: Location,
    pub to_location: Location,
    /// Provider polyline in the flexible-polyline format. When absent the
    /// route is treated as the straight segment between its endpoints.
    #[serde(default)]
    pub encoded_polyline: Option<String>,
    #[serde(default)]
    pub monitor_days: MonitorDays,
    /// Preferred local reminder time.
    #[serde(default)]
    pub alert_time: Option<NaiveTime>,
    /// Minutes before the optimal departure to send the reminder. Falls
    /// back to the user's setting, then the host default.
    #[serde(default)]
    pub alert_advance_minutes: Option<i64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Fixed offset of the user's local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

const fn default_active() -> bool {
    true
}

impl RouteRecord {
    /// Attaches decoded geometry, producing a [`Route`].
    #[must_use]
    pub fn into_route(self, polyline: Vec<Coordinate>) -> Route {
        Route {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            from_location: self.from_location,
            to_location: self.to_location,
            polyline,
            monitor_days: self.monitor_days,
            alert_time: self.alert_time,
            alert_advance_minutes: self.alert_advance_minutes,
            optimal_time: None,
            is_active: self.is_active,
            utc_offset_minutes: self.utc_offset_minutes,
        }
    }
}

/// A monitored route with decoded geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub from_location: Location,
    pub to_location: Location,
    /// Decoded, simplified waypoints.
    pub polyline: Vec<Coordinate>,
    pub monitor_days: MonitorDays,
    pub alert_time: Option<NaiveTime>,
    pub alert_advance_minutes: Option<i64>,
    /// Last recommended departure, when one has been computed.
    pub optimal_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub utc_offset_minutes: i32,
}

impl Route {
    /// # Errors
    ///
    /// * [`RouteError::InvalidUtcOffset`] if the offset is beyond +/-14
    ///   hours
    /// * [`RouteError::InvalidAlertAdvance`] if the alert advance is
    ///   negative or longer than a day
    pub fn validate(&self) -> Result<(), RouteError> {
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(RouteError::InvalidUtcOffset {
                id: self.id.clone(),
                minutes: self.utc_offset_minutes,
            });
        }
        if let Some(minutes) = self.alert_advance_minutes
            && !(0..=MAX_ALERT_ADVANCE_MINUTES).contains(&minutes)
        {
            return Err(RouteError::InvalidAlertAdvance {
                id: self.id.clone(),
                minutes,
            });
        }
        Ok(())
    }

    /// The route's local time zone. Out-of-range offsets fall back to UTC.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// `instant` in the route's local time.
    #[must_use]
    pub fn local_time(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset())
    }

    /// The local calendar date at `instant`.
    #[must_use]
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local_time(instant).date_naive()
    }

    /// Returns `true` if the route is active and monitored on the local
    /// day containing `instant`.
    #[must_use]
    pub fn is_monitored_at(&self, instant: DateTime<Utc>) -> bool {
        self.is_active && self.monitor_days.includes(self.local_date(instant))
    }

    /// The preferred reminder time on the local day containing `instant`,
    /// as a UTC instant.
    #[must_use]
    pub fn alert_instant_on(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = self.alert_time?;
        self.local_date(instant)
            .and_time(time)
            .and_local_timezone(self.offset())
            .single()
            .map(|local| local.with_timezone(&Utc))
    }
}
