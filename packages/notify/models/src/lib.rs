#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Departure alerts and the per-route scheduling state behind them.
//!
//! The scheduler never delivers anything itself. It emits
//! [`ScheduleDecision`]s carrying [`DepartureAlert`]s, and a delivery
//! collaborator is responsible for transport.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Why an alert was produced.
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
pub enum AlertKind {
    /// Leaving now is the best option.
    OptimalNow,
    /// The best slot is too close for a scheduled reminder.
    Immediate,
    /// A reminder ahead of the best slot.
    Scheduled,
    /// A user-requested one-off alert, not tied to a route cycle.
    OneTime,
}

/// When an alert should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "at", rename_all = "snake_case")]
pub enum AlertTrigger {
    Immediate,
    At(DateTime<Utc>),
}

/// A notification decision handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartureAlert {
    pub id: Uuid,
    pub user_id: String,
    /// `None` for one-time alerts.
    pub route_id: Option<String>,
    pub kind: AlertKind,
    pub title: String,
    pub body: String,
    pub trigger: AlertTrigger,
    /// Set once the alert has been handed off for delivery.
    #[serde(default)]
    pub delivered: bool,
}

impl DepartureAlert {
    /// Creates an undelivered alert with a fresh id.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        route_id: Option<String>,
        kind: AlertKind,
        title: impl Into<String>,
        body: impl Into<String>,
        trigger: AlertTrigger,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            route_id,
            kind,
            title: title.into(),
            body: body.into(),
            trigger,
            delivered: false,
        }
    }

    #[must_use]
    pub const fn trigger_at(&self) -> Option<DateTime<Utc>> {
        match self.trigger {
            AlertTrigger::Immediate => None,
            AlertTrigger::At(at) => Some(at),
        }
    }

    /// Returns `true` if the alert should be delivered at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.trigger_at().is_none_or(|at| at <= now)
    }
}

/// Where a route is in its notification cycle.
///
/// Recurring routes loop `Idle -> Scheduled -> Fired -> Idle`; a `Fired`
/// phase lapses back to `Idle` on the next local day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SchedulePhase {
    #[default]
    Idle,
    /// A reminder is pending with the delivery collaborator.
    Scheduled {
        trigger_at: DateTime<Utc>,
        alert_id: Uuid,
    },
    /// A departure notification went out on this local date.
    Fired { date: NaiveDate },
}

/// Scheduling state stored per route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteScheduleState {
    pub route_id: String,
    pub phase: SchedulePhase,
    /// Local date of the last departure notification; at most one per day.
    pub last_fired_on: Option<NaiveDate>,
    /// Set after a route or preference edit to force the next cycle to
    /// reschedule even if the target time is unchanged.
    #[serde(default)]
    pub needs_reschedule: bool,
    /// Id of the alert behind the current `Scheduled` or `Fired` phase.
    #[serde(default)]
    pub last_alert_id: Option<Uuid>,
    /// Incremented by the store on every successful compare-and-set.
    #[serde(default)]
    pub version: u64,
}

impl RouteScheduleState {
    /// The state of a route the store has never seen.
    #[must_use]
    pub fn idle(route_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            phase: SchedulePhase::Idle,
            last_fired_on: None,
            needs_reschedule: false,
            last_alert_id: None,
            version: 0,
        }
    }

    /// Returns `true` if the route already notified on `date`.
    #[must_use]
    pub fn fired_on(&self, date: NaiveDate) -> bool {
        self.last_fired_on == Some(date)
    }

    #[must_use]
    pub const fn pending_alert_id(&self) -> Option<Uuid> {
        match self.phase {
            SchedulePhase::Scheduled { alert_id, .. } => Some(alert_id),
            SchedulePhase::Idle | SchedulePhase::Fired { .. } => None,
        }
    }
}

/// Why a route's pending alert was cancelled.
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
pub enum CancelReason {
    Deactivated,
    NotMonitoredToday,
    Deleted,
    /// Superseded by a fire-now decision.
    Superseded,
}

/// What the scheduler decided for one route in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ScheduleDecision {
    /// Deliver `alert` now, cancelling `cancels` first if set.
    Fire {
        alert: DepartureAlert,
        cancels: Option<Uuid>,
    },
    /// Hand `alert` to the delivery collaborator for later, replacing
    /// `replaces` if set.
    Schedule {
        alert: DepartureAlert,
        replaces: Option<Uuid>,
    },
    /// Withdraw a pending alert.
    Cancel {
        route_id: String,
        alert_id: Uuid,
        reason: CancelReason,
    },
    /// Nothing to do this cycle.
    Unchanged { route_id: String },
}

impl ScheduleDecision {
    /// The alert to deliver or schedule, if any.
    #[must_use]
    pub const fn alert(&self) -> Option<&DepartureAlert> {
        match self {
            Self::Fire { alert, .. } | Self::Schedule { alert, .. } => Some(alert),
            Self::Cancel { .. } | Self::Unchanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 7, hour, minute, 0).unwrap()
    }

    #[test]
    fn due_alerts() {
        let immediate = DepartureAlert::new(
            "user-1",
            None,
            AlertKind::OneTime,
            "t",
            "b",
            AlertTrigger::Immediate,
        );
        assert!(immediate.is_due(at(0, 0)));

        let later = DepartureAlert::new(
            "user-1",
            Some("route-1".to_string()),
            AlertKind::Scheduled,
            "t",
            "b",
            AlertTrigger::At(at(7, 30)),
        );
        assert!(!later.is_due(at(7, 29)));
        assert!(later.is_due(at(7, 30)));
    }

    #[test]
    fn phase_wire_format() {
        let fired = SchedulePhase::Fired {
            date: NaiveDate::from_ymd_opt(2026, 4, 7).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(fired).unwrap(),
            serde_json::json!({"phase": "fired", "date": "2026-04-07"})
        );

        let id = Uuid::nil();
        let scheduled = SchedulePhase::Scheduled {
            trigger_at: at(7, 0),
            alert_id: id,
        };
        let json = serde_json::to_value(scheduled).unwrap();
        assert_eq!(json["phase"], "scheduled");
        assert_eq!(json["alertId"], id.to_string());
        assert_eq!(
            serde_json::from_value::<SchedulePhase>(json).unwrap(),
            scheduled
        );
    }

    #[test]
    fn state_helpers() {
        let mut state = RouteScheduleState::idle("route-1");
        let today = NaiveDate::from_ymd_opt(2026, 4, 7).unwrap();
        assert!(!state.fired_on(today));
        assert_eq!(state.pending_alert_id(), None);

        state.last_fired_on = Some(today);
        let id = Uuid::new_v4();
        state.phase = SchedulePhase::Scheduled {
            trigger_at: at(8, 0),
            alert_id: id,
        };
        assert!(state.fired_on(today));
        assert_eq!(state.pending_alert_id(), Some(id));
    }

    #[test]
    fn trigger_wire_format() {
        assert_eq!(
            serde_json::to_value(AlertTrigger::Immediate).unwrap(),
            serde_json::json!({"type": "immediate"})
        );
        assert_eq!(
            serde_json::to_value(AlertTrigger::At(at(7, 30))).unwrap(),
            serde_json::json!({"type": "at", "at": "2026-04-07T07:30:00Z"})
        );
    }
}
