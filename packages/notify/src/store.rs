//! Scheduling-state storage.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use commute_risk_notify_models::{DepartureAlert, RouteScheduleState};

use crate::StoreError;

/// Keyed storage for per-route scheduling state and per-user one-time
/// alerts.
///
/// Route state is versioned. Writers read a state, compute the next one
/// and commit it with [`SchedulingStore::compare_and_set`], which only
/// succeeds if nobody else committed in between.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    /// Returns the stored state for `route_id`, or a fresh idle state with
    /// version 0 if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    async fn get(&self, route_id: &str) -> Result<RouteScheduleState, StoreError>;

    /// Stores `next` if the current version of `next.route_id` is still
    /// `expected_version`. On success the stored version becomes
    /// `expected_version + 1`. Returns `false` if the version moved on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be written.
    async fn compare_and_set(
        &self,
        expected_version: u64,
        next: RouteScheduleState,
    ) -> Result<bool, StoreError>;

    /// Removes a route's state if its version is still `expected_version`.
    /// Removing a route with no state succeeds when `expected_version` is 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be written.
    async fn remove(&self, route_id: &str, expected_version: u64) -> Result<bool, StoreError>;

    /// Ids of every route with stored state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    async fn route_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Makes `alert` the user's pending one-time alert, returning the alert
    /// it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be written.
    async fn replace_pending(
        &self,
        alert: DepartureAlert,
    ) -> Result<Option<DepartureAlert>, StoreError>;

    /// Removes and returns the user's pending one-time alert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be written.
    async fn take_pending(&self, user_id: &str) -> Result<Option<DepartureAlert>, StoreError>;

    /// Puts `alert` back as the user's pending one-time alert unless a
    /// newer one took its place. Returns `false` if the slot was taken.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be written.
    async fn restore_pending(&self, alert: DepartureAlert) -> Result<bool, StoreError>;

    /// Removes and returns every pending one-time alert due at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be written.
    async fn take_due_pending(&self, now: DateTime<Utc>)
    -> Result<Vec<DepartureAlert>, StoreError>;
}

/// Process-local [`SchedulingStore`].
#[derive(Debug, Default)]
pub struct InMemorySchedulingStore {
    routes: Mutex<BTreeMap<String, RouteScheduleState>>,
    pending: Mutex<BTreeMap<String, DepartureAlert>>,
}

impl InMemorySchedulingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

#[async_trait]
impl SchedulingStore for InMemorySchedulingStore {
    async fn get(&self, route_id: &str) -> Result<RouteScheduleState, StoreError> {
        Ok(lock(&self.routes)?
            .get(route_id)
            .cloned()
            .unwrap_or_else(|| RouteScheduleState::idle(route_id)))
    }

    async fn compare_and_set(
        &self,
        expected_version: u64,
        mut next: RouteScheduleState,
    ) -> Result<bool, StoreError> {
        let mut routes = lock(&self.routes)?;
        let current = routes.get(&next.route_id).map_or(0, |s| s.version);
        if current != expected_version {
            return Ok(false);
        }
        next.version = expected_version + 1;
        routes.insert(next.route_id.clone(), next);
        Ok(true)
    }

    async fn remove(&self, route_id: &str, expected_version: u64) -> Result<bool, StoreError> {
        let mut routes = lock(&self.routes)?;
        match routes.get(route_id) {
            None => Ok(expected_version == 0),
            Some(state) if state.version == expected_version => {
                routes.remove(route_id);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn route_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.routes)?.keys().cloned().collect())
    }

    async fn replace_pending(
        &self,
        alert: DepartureAlert,
    ) -> Result<Option<DepartureAlert>, StoreError> {
        Ok(lock(&self.pending)?.insert(alert.user_id.clone(), alert))
    }

    async fn take_pending(&self, user_id: &str) -> Result<Option<DepartureAlert>, StoreError> {
        Ok(lock(&self.pending)?.remove(user_id))
    }

    async fn restore_pending(&self, alert: DepartureAlert) -> Result<bool, StoreError> {
        let mut pending = lock(&self.pending)?;
        if pending.contains_key(&alert.user_id) {
            return Ok(false);
        }
        pending.insert(alert.user_id.clone(), alert);
        Ok(true)
    }

    async fn take_due_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DepartureAlert>, StoreError> {
        let mut pending = lock(&self.pending)?;
        let due: Vec<String> = pending
            .iter()
            .filter(|(_, alert)| alert.is_due(now))
            .map(|(user_id, _)| user_id.clone())
            .collect();
        Ok(due
            .iter()
            .filter_map(|user_id| pending.remove(user_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _};
    use commute_risk_notify_models::{AlertKind, AlertTrigger, SchedulePhase};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 7, 7, 0, 0).unwrap()
    }

    fn one_time(user_id: &str, trigger: AlertTrigger) -> DepartureAlert {
        DepartureAlert::new(user_id, None, AlertKind::OneTime, "title", "body", trigger)
    }

    #[tokio::test]
    async fn unknown_route_is_idle_at_version_zero() {
        let store = InMemorySchedulingStore::new();
        let state = store.get("route-1").await.unwrap();
        assert_eq!(state, RouteScheduleState::idle("route-1"));
        assert!(store.route_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_versions() {
        let store = InMemorySchedulingStore::new();
        let mut next = store.get("route-1").await.unwrap();
        next.phase = SchedulePhase::Fired {
            date: now().date_naive(),
        };

        assert!(store.compare_and_set(0, next.clone()).await.unwrap());
        assert_eq!(store.get("route-1").await.unwrap().version, 1);

        // A second writer that read version 0 loses.
        assert!(!store.compare_and_set(0, next.clone()).await.unwrap());
        assert!(store.compare_and_set(1, next).await.unwrap());
        assert_eq!(store.get("route-1").await.unwrap().version, 2);
        assert_eq!(store.route_ids().await.unwrap(), vec!["route-1"]);
    }

    #[tokio::test]
    async fn remove_is_versioned() {
        let store = InMemorySchedulingStore::new();
        assert!(store.remove("missing", 0).await.unwrap());

        let state = store.get("route-1").await.unwrap();
        assert!(store.compare_and_set(0, state).await.unwrap());
        assert!(!store.remove("route-1", 0).await.unwrap());
        assert!(store.remove("route-1", 1).await.unwrap());
        assert!(store.route_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_pending_alert_per_user() {
        let store = InMemorySchedulingStore::new();
        let first = one_time("user-1", AlertTrigger::Immediate);
        let second = one_time("user-1", AlertTrigger::At(now() + Duration::hours(1)));

        assert_eq!(store.replace_pending(first.clone()).await.unwrap(), None);
        assert_eq!(
            store.replace_pending(second.clone()).await.unwrap(),
            Some(first)
        );
        assert_eq!(store.take_pending("user-1").await.unwrap(), Some(second));
        assert_eq!(store.take_pending("user-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn takes_only_due_alerts() {
        let store = InMemorySchedulingStore::new();
        let due = one_time("user-1", AlertTrigger::At(now() - Duration::minutes(1)));
        let later = one_time("user-2", AlertTrigger::At(now() + Duration::minutes(1)));
        store.replace_pending(due.clone()).await.unwrap();
        store.replace_pending(later.clone()).await.unwrap();

        assert_eq!(store.take_due_pending(now()).await.unwrap(), vec![due]);
        assert_eq!(store.take_pending("user-2").await.unwrap(), Some(later));
    }

    #[tokio::test]
    async fn restore_does_not_overwrite_a_newer_alert() {
        let store = InMemorySchedulingStore::new();
        let due = one_time("user-1", AlertTrigger::Immediate);
        store.replace_pending(due.clone()).await.unwrap();
        let taken = store.take_due_pending(now()).await.unwrap();
        assert_eq!(taken, vec![due.clone()]);

        assert!(store.restore_pending(due.clone()).await.unwrap());
        assert_eq!(store.take_pending("user-1").await.unwrap(), Some(due.clone()));

        let newer = one_time("user-1", AlertTrigger::At(now() + Duration::hours(1)));
        store.replace_pending(newer.clone()).await.unwrap();
        assert!(!store.restore_pending(due).await.unwrap());
        assert_eq!(store.take_pending("user-1").await.unwrap(), Some(newer));
    }
}
