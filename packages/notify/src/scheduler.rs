//! Per-route notification state machine.
//!
//! Each cycle, a route's latest [`DepartureRecommendation`] is turned into
//! one [`ScheduleDecision`]:
//!
//! * optimal now: fire an "optimal now" alert, once per local day
//! * optimal slot closer than the advance window: fire an "immediate" alert
//! * otherwise: schedule a reminder `optimal - advance` from now, replacing
//!   any pending reminder whose time moved by more than the tolerance
//!
//! Decisions are computed by the pure [`NotificationScheduler::plan`] and
//! committed with compare-and-set, retrying a bounded number of times when
//! another tick got there first.

use chrono::{DateTime, Duration, Utc};
use commute_risk_notify_models::{
    AlertKind, AlertTrigger, CancelReason, DepartureAlert, RouteScheduleState, ScheduleDecision,
    SchedulePhase,
};
use commute_risk_risk_models::DepartureRecommendation;
use commute_risk_route_models::Route;

use crate::{SchedulerError, SchedulingStore, messages};

/// How many times a lost compare-and-set is retried before giving up.
pub const MAX_CAS_ATTEMPTS: usize = 3;

/// Scheduler tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How long before the optimal departure the reminder fires.
    pub alert_advance_minutes: i64,
    /// Pending reminders are only replaced when their time moves by more
    /// than this.
    pub reschedule_tolerance_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            alert_advance_minutes: 30,
            reschedule_tolerance_minutes: 1,
        }
    }
}

/// Result of one route's sweep step.
pub type SweepResult = (String, Result<ScheduleDecision, SchedulerError>);

pub struct NotificationScheduler<S> {
    store: S,
    config: SchedulerConfig,
}

impl<S: SchedulingStore> NotificationScheduler<S> {
    pub const fn new(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Computes the decision and next state for `route` without touching
    /// the store.
    #[must_use]
    pub fn plan(
        &self,
        route: &Route,
        rec: &DepartureRecommendation,
        state: &RouteScheduleState,
        now: DateTime<Utc>,
    ) -> (ScheduleDecision, RouteScheduleState) {
        let mut next = state.clone();
        settle(&mut next, route, now);

        if !route.is_active {
            return cancel_pending(&route.id, next, CancelReason::Deactivated);
        }
        if !route.is_monitored_at(now) {
            return cancel_pending(&route.id, next, CancelReason::NotMonitoredToday);
        }

        let today = route.local_date(now);
        if next.fired_on(today) {
            return (unchanged(&route.id), next);
        }

        let force = std::mem::take(&mut next.needs_reschedule);
        let pending = next.pending_alert_id();

        let fire = |kind: AlertKind, mut next: RouteScheduleState| {
            let (title, body) = match kind {
                AlertKind::OptimalNow => messages::optimal_now(route, rec),
                _ => messages::immediate(route, rec),
            };
            let alert = DepartureAlert::new(
                route.user_id.clone(),
                Some(route.id.clone()),
                kind,
                title,
                body,
                AlertTrigger::Immediate,
            );
            next.phase = SchedulePhase::Fired { date: today };
            next.last_fired_on = Some(today);
            next.last_alert_id = Some(alert.id);
            log::debug!("route {}: firing {kind} alert {}", route.id, alert.id);
            (
                ScheduleDecision::Fire {
                    alert,
                    cancels: pending,
                },
                next,
            )
        };

        if rec.is_optimal_now {
            return fire(AlertKind::OptimalNow, next);
        }

        let Some(trigger_at) = self.reminder_time(route, rec, now) else {
            return fire(AlertKind::Immediate, next);
        };

        if let SchedulePhase::Scheduled {
            trigger_at: current,
            ..
        } = next.phase
        {
            let tolerance = Duration::minutes(self.config.reschedule_tolerance_minutes);
            if !force && (trigger_at - current).abs() <= tolerance {
                return (unchanged(&route.id), next);
            }
        }

        let (title, body) = messages::scheduled(route, rec);
        let alert = DepartureAlert::new(
            route.user_id.clone(),
            Some(route.id.clone()),
            AlertKind::Scheduled,
            title,
            body,
            AlertTrigger::At(trigger_at),
        );
        next.phase = SchedulePhase::Scheduled {
            trigger_at,
            alert_id: alert.id,
        };
        next.last_alert_id = Some(alert.id);
        log::debug!(
            "route {}: scheduling alert {} at {trigger_at} (replaces {pending:?})",
            route.id,
            alert.id
        );

        (
            ScheduleDecision::Schedule {
                alert,
                replaces: pending,
            },
            next,
        )
    }

    /// When the reminder should go out, or `None` if it should go out now.
    ///
    /// The route's preferred alert time wins when it is still ahead today
    /// and before the optimal departure. Otherwise the reminder is
    /// `optimal - advance` minutes from now, using the route's own advance
    /// when it has one.
    fn reminder_time(
        &self,
        route: &Route,
        rec: &DepartureRecommendation,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if let Some(preferred) = route
            .alert_instant_on(now)
            .filter(|at| *at > now && *at < rec.optimal_time)
        {
            return Some(preferred);
        }

        let advance = route
            .alert_advance_minutes
            .unwrap_or(self.config.alert_advance_minutes);
        let notify_in = rec.optimal_departure_minutes - advance;
        (notify_in > 0).then(|| now + Duration::minutes(notify_in))
    }

    /// Plans and commits the decision for `route`.
    ///
    /// # Errors
    ///
    /// * [`SchedulerError::Route`] if the route is invalid
    /// * [`SchedulerError::Store`] if the store fails
    /// * [`SchedulerError::Conflict`] if the compare-and-set kept losing
    pub async fn apply(
        &self,
        route: &Route,
        rec: &DepartureRecommendation,
        now: DateTime<Utc>,
    ) -> Result<ScheduleDecision, SchedulerError> {
        route.validate()?;
        self.commit(&route.id, |state| self.plan(route, rec, state, now))
            .await
    }

    /// Rolls back the state change behind a `Fire` or `Schedule` decision
    /// the notifier failed to take, so the next cycle decides again.
    ///
    /// Does nothing if the route has since moved on to another alert.
    ///
    /// # Errors
    ///
    /// See [`apply`](Self::apply).
    pub async fn release(&self, decision: &ScheduleDecision) -> Result<(), SchedulerError> {
        let Some(alert) = decision.alert() else {
            return Ok(());
        };
        let Some(route_id) = alert.route_id.as_deref() else {
            return Ok(());
        };
        let alert_id = alert.id;

        self.commit(route_id, |state| {
            let mut next = state.clone();
            if next.last_alert_id == Some(alert_id) {
                if let SchedulePhase::Fired { date } = next.phase
                    && next.last_fired_on == Some(date)
                {
                    next.last_fired_on = None;
                }
                next.phase = SchedulePhase::Idle;
                next.last_alert_id = None;
                log::debug!("route {route_id}: released undelivered alert {alert_id}");
            }
            (unchanged(route_id), next)
        })
        .await?;
        Ok(())
    }

    /// Forces the next [`apply`](Self::apply) for `route_id` to reschedule
    /// even if the reminder time has not moved. Call after a route or
    /// preference edit.
    ///
    /// # Errors
    ///
    /// See [`apply`](Self::apply).
    pub async fn invalidate(&self, route_id: &str) -> Result<(), SchedulerError> {
        self.commit(route_id, |state| {
            let mut next = state.clone();
            next.needs_reschedule = true;
            (unchanged(route_id), next)
        })
        .await?;
        Ok(())
    }

    /// Cancels any pending reminder for `route_id`.
    ///
    /// Deactivation also clears the once-per-day dedupe so a reactivated
    /// route can notify again. Deletion removes the route's state entirely.
    ///
    /// # Errors
    ///
    /// See [`apply`](Self::apply).
    pub async fn cancel(
        &self,
        route_id: &str,
        reason: CancelReason,
    ) -> Result<ScheduleDecision, SchedulerError> {
        if reason != CancelReason::Deleted {
            return self
                .commit(route_id, |state| cancel_pending(route_id, state.clone(), reason))
                .await;
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let state = self.store.get(route_id).await?;
            let (decision, _) = cancel_pending(route_id, state.clone(), reason);
            if self.store.remove(route_id, state.version).await? {
                log::debug!("route {route_id}: scheduling state removed");
                return Ok(decision);
            }
        }
        Err(SchedulerError::Conflict {
            route_id: route_id.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Reconciles stored state with the current set of routes.
    ///
    /// Routes that no longer exist, are inactive, or are not monitored
    /// today have their pending reminders cancelled; elapsed reminders on
    /// the remaining routes are marked fired. One route's failure does not
    /// stop the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the stored route ids cannot be
    /// listed.
    pub async fn sweep(
        &self,
        routes: &[Route],
        now: DateTime<Utc>,
    ) -> Result<Vec<SweepResult>, SchedulerError> {
        let mut results = Vec::new();
        for route_id in self.store.route_ids().await? {
            let route = routes.iter().find(|r| r.id == route_id);
            let result = match route {
                None => self.cancel(&route_id, CancelReason::Deleted).await,
                Some(route) if !route.is_active => {
                    self.cancel(&route_id, CancelReason::Deactivated).await
                }
                Some(route) if !route.is_monitored_at(now) => {
                    self.cancel(&route_id, CancelReason::NotMonitoredToday).await
                }
                Some(route) => {
                    self.commit(&route_id, |state| {
                        let mut next = state.clone();
                        settle(&mut next, route, now);
                        (unchanged(&route_id), next)
                    })
                    .await
                }
            };
            if let Err(e) = &result {
                log::warn!("route {route_id}: sweep failed: {e}");
            }
            results.push((route_id, result));
        }
        Ok(results)
    }

    /// Makes a one-time alert the user's pending alert, returning the one
    /// it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the store fails.
    pub async fn set_one_time(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        trigger: AlertTrigger,
    ) -> Result<(DepartureAlert, Option<DepartureAlert>), SchedulerError> {
        let alert = DepartureAlert::new(user_id, None, AlertKind::OneTime, title, body, trigger);
        let replaced = self.store.replace_pending(alert.clone()).await?;
        if let Some(old) = &replaced {
            log::debug!("user {user_id}: one-time alert {} replaced by {}", old.id, alert.id);
        }
        Ok((alert, replaced))
    }

    /// Withdraws the user's pending one-time alert.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the store fails.
    pub async fn cancel_one_time(
        &self,
        user_id: &str,
    ) -> Result<Option<DepartureAlert>, SchedulerError> {
        Ok(self.store.take_pending(user_id).await?)
    }

    /// Puts back a due one-time alert that could not be delivered, unless
    /// the user has a newer one pending. Returns `true` if it was restored.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the store fails.
    pub async fn restore_one_time(&self, alert: DepartureAlert) -> Result<bool, SchedulerError> {
        let (user_id, alert_id) = (alert.user_id.clone(), alert.id);
        let restored = self.store.restore_pending(alert).await?;
        if !restored {
            log::debug!("user {user_id}: undelivered one-time alert {alert_id} was superseded");
        }
        Ok(restored)
    }

    /// Removes and returns every one-time alert due at `now`. Each is
    /// returned exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the store fails.
    pub async fn take_due_one_time(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DepartureAlert>, SchedulerError> {
        Ok(self.store.take_due_pending(now).await?)
    }

    async fn commit<F>(&self, route_id: &str, step: F) -> Result<ScheduleDecision, SchedulerError>
    where
        F: Fn(&RouteScheduleState) -> (ScheduleDecision, RouteScheduleState) + Send + Sync,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.store.get(route_id).await?;
            let (decision, next) = step(&current);
            if next == current {
                return Ok(decision);
            }
            if self.store.compare_and_set(current.version, next).await? {
                return Ok(decision);
            }
            log::debug!("route {route_id}: lost scheduling race (attempt {attempt})");
        }

        Err(SchedulerError::Conflict {
            route_id: route_id.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

/// Advances time-driven transitions: an elapsed reminder counts as fired
/// on its local date, and a fired phase from an earlier day lapses to
/// idle.
fn settle(state: &mut RouteScheduleState, route: &Route, now: DateTime<Utc>) {
    if let SchedulePhase::Scheduled { trigger_at, .. } = state.phase
        && trigger_at <= now
    {
        let date = route.local_date(trigger_at);
        state.phase = SchedulePhase::Fired { date };
        state.last_fired_on = Some(date);
    }
    if let SchedulePhase::Fired { date } = state.phase
        && date != route.local_date(now)
    {
        state.phase = SchedulePhase::Idle;
        state.last_alert_id = None;
    }
}

fn cancel_pending(
    route_id: &str,
    mut next: RouteScheduleState,
    reason: CancelReason,
) -> (ScheduleDecision, RouteScheduleState) {
    let decision = match next.pending_alert_id() {
        Some(alert_id) => {
            next.phase = SchedulePhase::Idle;
            next.last_alert_id = None;
            log::debug!("route {route_id}: cancelling alert {alert_id} ({reason})");
            ScheduleDecision::Cancel {
                route_id: route_id.to_string(),
                alert_id,
                reason,
            }
        }
        None => unchanged(route_id),
    };
    if reason == CancelReason::Deactivated {
        next.phase = SchedulePhase::Idle;
        next.last_fired_on = None;
        next.last_alert_id = None;
    }
    (decision, next)
}

fn unchanged(route_id: &str) -> ScheduleDecision {
    ScheduleDecision::Unchanged {
        route_id: route_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeZone as _};
    use commute_risk_geo_models::Coordinate;
    use commute_risk_risk_models::RiskClass;
    use commute_risk_route_models::{Location, MonitorDays};

    use super::*;
    use crate::{InMemorySchedulingStore, StoreError};

    fn now() -> DateTime<Utc> {
        // Tuesday
        Utc.with_ymd_and_hms(2026, 4, 7, 7, 0, 0).unwrap()
    }

    fn route() -> Route {
        let location = |name: &str, lat| Location {
            name: name.to_string(),
            coordinate: Coordinate { lat, lng: -74.0 },
        };
        Route {
            id: "route-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Commute".to_string(),
            from_location: location("Home", 40.70),
            to_location: location("Office", 40.75),
            polyline: vec![],
            monitor_days: MonitorDays::ALL,
            alert_time: None,
            alert_advance_minutes: None,
            optimal_time: None,
            is_active: true,
            utc_offset_minutes: 0,
        }
    }

    fn rec(offset: i64, is_optimal_now: bool, at: DateTime<Utc>) -> DepartureRecommendation {
        DepartureRecommendation {
            optimal_departure_minutes: offset,
            optimal_time: at + Duration::minutes(offset),
            is_optimal_now,
            current_score: 70,
            current_classification: RiskClass::High,
            optimal_score: 40,
            classification: RiskClass::Medium,
            reason: "Leave later: traffic is expected to ease".to_string(),
            forecast: vec![],
        }
    }

    fn scheduler() -> NotificationScheduler<InMemorySchedulingStore> {
        NotificationScheduler::new(InMemorySchedulingStore::new(), SchedulerConfig::default())
    }

    fn scheduled_id(decision: &ScheduleDecision) -> uuid::Uuid {
        match decision {
            ScheduleDecision::Schedule { alert, .. } => alert.id,
            other => panic!("expected schedule, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn optimal_slot_inside_advance_window_fires_immediately() {
        // Forecast 70 / 40 / 55: optimal at +15, 15 - 30 <= 0.
        let s = scheduler();
        let decision = s.apply(&route(), &rec(15, false, now()), now()).await.unwrap();

        let ScheduleDecision::Fire { alert, cancels } = decision else {
            panic!("expected fire, got {decision:?}");
        };
        assert_eq!(alert.kind, AlertKind::Immediate);
        assert_eq!(alert.trigger, AlertTrigger::Immediate);
        assert_eq!(alert.route_id.as_deref(), Some("route-1"));
        assert_eq!(cancels, None);
    }

    #[tokio::test]
    async fn optimal_now_fires_once_per_day() {
        let s = scheduler();
        let first = s.apply(&route(), &rec(0, true, now()), now()).await.unwrap();
        assert_eq!(first.alert().map(|a| a.kind), Some(AlertKind::OptimalNow));

        let later = now() + Duration::minutes(10);
        let second = s.apply(&route(), &rec(0, true, later), later).await.unwrap();
        assert!(matches!(second, ScheduleDecision::Unchanged { .. }));

        let tomorrow = now() + Duration::days(1);
        let third = s.apply(&route(), &rec(0, true, tomorrow), tomorrow).await.unwrap();
        assert!(matches!(third, ScheduleDecision::Fire { .. }));
    }

    #[tokio::test]
    async fn schedules_and_only_reschedules_beyond_tolerance() {
        let s = scheduler();
        let first = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        let first_id = scheduled_id(&first);
        assert_eq!(
            first.alert().and_then(DepartureAlert::trigger_at),
            Some(now() + Duration::minutes(90))
        );

        let same = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        assert!(matches!(same, ScheduleDecision::Unchanged { .. }));

        let nudged = s.apply(&route(), &rec(121, false, now()), now()).await.unwrap();
        assert!(matches!(nudged, ScheduleDecision::Unchanged { .. }));

        let moved = s.apply(&route(), &rec(135, false, now()), now()).await.unwrap();
        let ScheduleDecision::Schedule { replaces, .. } = &moved else {
            panic!("expected reschedule, got {moved:?}");
        };
        assert_eq!(*replaces, Some(first_id));
    }

    #[tokio::test]
    async fn invalidate_forces_reschedule() {
        let s = scheduler();
        let first = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        let first_id = scheduled_id(&first);

        s.invalidate("route-1").await.unwrap();
        let again = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        let ScheduleDecision::Schedule { replaces, .. } = again else {
            panic!("expected reschedule, got {again:?}");
        };
        assert_eq!(replaces, Some(first_id));

        let settled = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        assert!(matches!(settled, ScheduleDecision::Unchanged { .. }));
    }

    #[tokio::test]
    async fn elapsed_reminder_counts_as_fired_until_next_day() {
        let s = scheduler();
        s.apply(&route(), &rec(60, false, now()), now()).await.unwrap();

        // Reminder was due at +30.
        let after = now() + Duration::minutes(45);
        let decision = s.apply(&route(), &rec(90, false, after), after).await.unwrap();
        assert!(matches!(decision, ScheduleDecision::Unchanged { .. }));
        let state = s.store().get("route-1").await.unwrap();
        assert_eq!(
            state.phase,
            SchedulePhase::Fired {
                date: now().date_naive()
            }
        );

        let tomorrow = now() + Duration::days(1);
        let next_day = s.apply(&route(), &rec(60, false, tomorrow), tomorrow).await.unwrap();
        assert!(matches!(next_day, ScheduleDecision::Schedule { replaces: None, .. }));
    }

    #[tokio::test]
    async fn optimal_now_supersedes_pending_reminder() {
        let s = scheduler();
        let first = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        let first_id = scheduled_id(&first);

        let later = now() + Duration::minutes(5);
        let fire = s.apply(&route(), &rec(0, true, later), later).await.unwrap();
        assert!(matches!(
            fire,
            ScheduleDecision::Fire { cancels: Some(id), .. } if id == first_id
        ));
    }

    #[tokio::test]
    async fn preferred_alert_time_wins_when_ahead() {
        let mut route = route();
        route.alert_time = NaiveTime::from_hms_opt(7, 45, 0);
        let s = scheduler();

        let decision = s.apply(&route, &rec(90, false, now()), now()).await.unwrap();
        assert_eq!(
            decision.alert().and_then(DepartureAlert::trigger_at),
            Some(Utc.with_ymd_and_hms(2026, 4, 7, 7, 45, 0).unwrap())
        );

        // Preferred time after the optimal departure is ignored.
        route.alert_time = NaiveTime::from_hms_opt(9, 0, 0);
        let s = scheduler();
        let decision = s.apply(&route, &rec(90, false, now()), now()).await.unwrap();
        assert_eq!(
            decision.alert().and_then(DepartureAlert::trigger_at),
            Some(now() + Duration::minutes(60))
        );
    }

    #[tokio::test]
    async fn route_advance_overrides_the_default() {
        let mut eager = route();
        eager.alert_advance_minutes = Some(45);
        let s = scheduler();

        let decision = s.apply(&eager, &rec(90, false, now()), now()).await.unwrap();
        assert_eq!(
            decision.alert().and_then(DepartureAlert::trigger_at),
            Some(now() + Duration::minutes(45))
        );

        // An advance covering the whole wait fires right away.
        eager.alert_advance_minutes = Some(90);
        let s = scheduler();
        let decision = s.apply(&eager, &rec(90, false, now()), now()).await.unwrap();
        assert_eq!(decision.alert().map(|a| a.kind), Some(AlertKind::Immediate));
    }

    #[tokio::test]
    async fn released_fire_is_decided_again() {
        let s = scheduler();
        let fired = s.apply(&route(), &rec(15, false, now()), now()).await.unwrap();
        assert!(matches!(fired, ScheduleDecision::Fire { .. }));

        s.release(&fired).await.unwrap();
        let state = s.store().get("route-1").await.unwrap();
        assert_eq!(state.phase, SchedulePhase::Idle);
        assert_eq!(state.last_fired_on, None);

        let later = now() + Duration::minutes(5);
        let retried = s.apply(&route(), &rec(10, false, later), later).await.unwrap();
        let ScheduleDecision::Fire { alert, cancels: None } = &retried else {
            panic!("expected a fresh fire, got {retried:?}");
        };
        assert_ne!(Some(alert.id), fired.alert().map(|a| a.id));
    }

    #[tokio::test]
    async fn released_schedule_is_decided_again() {
        let s = scheduler();
        let first = s.apply(&route(), &rec(90, false, now()), now()).await.unwrap();
        s.release(&first).await.unwrap();
        assert_eq!(s.store().get("route-1").await.unwrap().pending_alert_id(), None);

        let later = now() + Duration::minutes(5);
        let retried = s.apply(&route(), &rec(85, false, later), later).await.unwrap();
        let ScheduleDecision::Schedule { replaces: None, .. } = &retried else {
            panic!("expected a fresh schedule, got {retried:?}");
        };
        assert_ne!(scheduled_id(&retried), scheduled_id(&first));
    }

    #[tokio::test]
    async fn release_ignores_a_superseded_alert() {
        let s = scheduler();
        let first = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        let moved = s.apply(&route(), &rec(150, false, now()), now()).await.unwrap();

        s.release(&first).await.unwrap();
        assert_eq!(
            s.store().get("route-1").await.unwrap().pending_alert_id(),
            Some(scheduled_id(&moved))
        );
    }

    #[tokio::test]
    async fn deactivation_cancels_and_clears_dedupe() {
        let s = scheduler();
        let first = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        let first_id = scheduled_id(&first);

        let mut inactive = route();
        inactive.is_active = false;
        let cancel = s.apply(&inactive, &rec(120, false, now()), now()).await.unwrap();
        assert_eq!(
            cancel,
            ScheduleDecision::Cancel {
                route_id: "route-1".to_string(),
                alert_id: first_id,
                reason: CancelReason::Deactivated,
            }
        );

        // Fired today, deactivated, reactivated: may notify again.
        s.apply(&route(), &rec(0, true, now()), now()).await.unwrap();
        s.cancel("route-1", CancelReason::Deactivated).await.unwrap();
        let again = s.apply(&route(), &rec(0, true, now()), now()).await.unwrap();
        assert!(matches!(again, ScheduleDecision::Fire { .. }));
    }

    #[tokio::test]
    async fn sweep_cancels_deleted_and_unmonitored_routes() {
        let s = scheduler();
        let mut weekend = route();
        weekend.id = "route-2".to_string();

        let kept = s.apply(&route(), &rec(120, false, now()), now()).await.unwrap();
        s.apply(&weekend, &rec(120, false, now()), now()).await.unwrap();
        let mut gone = route();
        gone.id = "route-3".to_string();
        s.apply(&gone, &rec(120, false, now()), now()).await.unwrap();

        weekend.monitor_days = MonitorDays([true, false, false, false, false, false, true]);
        let results = s.sweep(&[route(), weekend], now()).await.unwrap();
        assert_eq!(results.len(), 3);

        let by_id = |id: &str| {
            results
                .iter()
                .find(|(route_id, _)| route_id == id)
                .and_then(|(_, result)| result.as_ref().ok())
                .cloned()
        };
        assert!(matches!(by_id("route-1"), Some(ScheduleDecision::Unchanged { .. })));
        assert!(matches!(
            by_id("route-2"),
            Some(ScheduleDecision::Cancel {
                reason: CancelReason::NotMonitoredToday,
                ..
            })
        ));
        assert!(matches!(
            by_id("route-3"),
            Some(ScheduleDecision::Cancel {
                reason: CancelReason::Deleted,
                ..
            })
        ));

        let remaining = s.store().route_ids().await.unwrap();
        assert_eq!(remaining, vec!["route-1", "route-2"]);
        assert_eq!(
            s.store().get("route-1").await.unwrap().pending_alert_id(),
            Some(scheduled_id(&kept))
        );
    }

    #[tokio::test]
    async fn one_time_alert_slot() {
        let s = scheduler();
        let (first, replaced) = s
            .set_one_time("user-1", "Heads up", "Storm at 5pm", AlertTrigger::At(now()))
            .await
            .unwrap();
        assert!(replaced.is_none());

        let (second, replaced) = s
            .set_one_time(
                "user-1",
                "Heads up",
                "Storm moved to 6pm",
                AlertTrigger::At(now() + Duration::hours(1)),
            )
            .await
            .unwrap();
        assert_eq!(replaced.map(|a| a.id), Some(first.id));

        assert!(s.take_due_one_time(now()).await.unwrap().is_empty());
        let due = s.take_due_one_time(now() + Duration::hours(1)).await.unwrap();
        assert_eq!(due.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id]);
        assert!(s.cancel_one_time("user-1").await.unwrap().is_none());

        let [undelivered] = due.as_slice() else {
            panic!("expected one due alert, got {due:?}");
        };
        assert!(s.restore_one_time(undelivered.clone()).await.unwrap());
        let (newest, _) = s
            .set_one_time("user-1", "Heads up", "Storm over", AlertTrigger::Immediate)
            .await
            .unwrap();
        assert!(!s.restore_one_time(undelivered.clone()).await.unwrap());
        assert_eq!(s.cancel_one_time("user-1").await.unwrap().map(|a| a.id), Some(newest.id));
    }

    struct ContendedStore(InMemorySchedulingStore);

    #[async_trait]
    impl SchedulingStore for ContendedStore {
        async fn get(&self, route_id: &str) -> Result<RouteScheduleState, StoreError> {
            self.0.get(route_id).await
        }

        async fn compare_and_set(
            &self,
            _expected_version: u64,
            _next: RouteScheduleState,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn remove(&self, route_id: &str, version: u64) -> Result<bool, StoreError> {
            self.0.remove(route_id, version).await
        }

        async fn route_ids(&self) -> Result<Vec<String>, StoreError> {
            self.0.route_ids().await
        }

        async fn replace_pending(
            &self,
            alert: DepartureAlert,
        ) -> Result<Option<DepartureAlert>, StoreError> {
            self.0.replace_pending(alert).await
        }

        async fn take_pending(&self, user_id: &str) -> Result<Option<DepartureAlert>, StoreError> {
            self.0.take_pending(user_id).await
        }

        async fn restore_pending(&self, alert: DepartureAlert) -> Result<bool, StoreError> {
            self.0.restore_pending(alert).await
        }

        async fn take_due_pending(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<DepartureAlert>, StoreError> {
            self.0.take_due_pending(now).await
        }
    }

    #[tokio::test]
    async fn persistent_contention_is_a_retryable_conflict() {
        let s = NotificationScheduler::new(
            ContendedStore(InMemorySchedulingStore::new()),
            SchedulerConfig::default(),
        );
        let err = s
            .apply(&route(), &rec(0, true, now()), now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Conflict {
                attempts: MAX_CAS_ATTEMPTS,
                ..
            }
        ));
        assert!(err.is_retryable());
    }
}
