//! Live hazard event set for one aggregation host.
//!
//! Events are immutable once ingested except for a refresh of severity,
//! confidence and ttl when the same id is re-ingested.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use commute_risk_hazard_models::HazardEvent;

use crate::{HazardError, validate_event};

/// What [`HazardRegistry::upsert`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The id was new.
    Inserted,
    /// The id existed and its severity, confidence or ttl changed.
    Refreshed,
    /// The id existed and nothing refreshable changed.
    Unchanged,
}

/// Events keyed by id.
#[derive(Debug, Clone, Default)]
pub struct HazardRegistry {
    events: BTreeMap<String, HazardEvent>,
}

impl HazardRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new event or refreshes an existing one.
    ///
    /// On re-ingestion only `severity`, `confidence_score` and `ttl` are
    /// taken from the incoming event; location, type and source of the
    /// stored event are kept.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::InvalidEvent`] if the incoming event fails
    /// validation. The registry is left unchanged.
    pub fn upsert(&mut self, event: HazardEvent) -> Result<UpsertOutcome, HazardError> {
        validate_event(&event)?;

        let Some(existing) = self.events.get_mut(&event.id) else {
            log::trace!("inserting hazard event {} from {}", event.id, event.source.label());
            self.events.insert(event.id.clone(), event);
            return Ok(UpsertOutcome::Inserted);
        };

        if existing.severity == event.severity
            && existing.confidence_score == event.confidence_score
            && existing.ttl == event.ttl
        {
            return Ok(UpsertOutcome::Unchanged);
        }

        log::debug!(
            "refreshing hazard event {}: severity {} -> {}, confidence {} -> {}",
            event.id,
            existing.severity.level(),
            event.severity.level(),
            existing.confidence_score,
            event.confidence_score
        );
        existing.severity = event.severity;
        existing.confidence_score = event.confidence_score;
        existing.ttl = event.ttl;

        Ok(UpsertOutcome::Refreshed)
    }

    /// Removes every event whose ttl has passed, returning how many were
    /// dropped.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|_, event| !event.is_expired(now));
        let pruned = before - self.events.len();
        if pruned > 0 {
            log::debug!("pruned {pruned} expired hazard events");
        }
        pruned
    }

    /// Events not yet expired at `now`, in id order.
    pub fn live_at(&self, now: DateTime<Utc>) -> impl Iterator<Item = &HazardEvent> {
        self.events.values().filter(move |e| !e.is_expired(now))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&HazardEvent> {
        self.events.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FromIterator<HazardEvent> for HazardRegistry {
    /// Builds a registry, skipping events that fail validation.
    fn from_iter<T: IntoIterator<Item = HazardEvent>>(iter: T) -> Self {
        let mut registry = Self::new();
        for event in iter {
            if let Err(e) = registry.upsert(event) {
                log::warn!("skipping hazard event: {e}");
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use commute_risk_hazard_models::HazardSeverity;

    use super::*;
    use crate::test_support::{event, ttl};

    #[test]
    fn reingestion_refreshes_only_mutable_fields() {
        let mut registry = HazardRegistry::new();
        assert_eq!(
            registry.upsert(event("a", 40.0, -73.0, 2)).unwrap(),
            UpsertOutcome::Inserted
        );

        let mut update = event("a", 41.0, -74.0, 4);
        update.confidence_score = 95;
        update.ttl = ttl() + Duration::hours(1);
        assert_eq!(registry.upsert(update).unwrap(), UpsertOutcome::Refreshed);

        let stored = registry.get("a").unwrap();
        assert_eq!(stored.severity, HazardSeverity::High);
        assert_eq!(stored.confidence_score, 95);
        assert_eq!(stored.ttl, ttl() + Duration::hours(1));
        assert!((stored.location.lat - 40.0).abs() < f64::EPSILON);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn identical_reingestion_is_unchanged() {
        let mut registry = HazardRegistry::new();
        registry.upsert(event("a", 40.0, -73.0, 2)).unwrap();
        assert_eq!(
            registry.upsert(event("a", 40.0, -73.0, 2)).unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[test]
    fn invalid_event_leaves_registry_untouched() {
        let mut registry = HazardRegistry::new();
        registry.upsert(event("a", 40.0, -73.0, 2)).unwrap();

        let mut bad = event("a", 40.0, -73.0, 5);
        bad.confidence_score = 200;
        assert!(registry.upsert(bad).is_err());
        assert_eq!(registry.get("a").unwrap().severity, HazardSeverity::Low);
    }

    #[test]
    fn expiry_and_pruning() {
        let mut early = event("early", 40.0, -73.0, 2);
        early.ttl = ttl() - Duration::minutes(30);
        let late = event("late", 40.0, -73.0, 2);

        let mut registry: HazardRegistry = vec![early, late].into_iter().collect();
        let now = ttl() - Duration::minutes(10);

        let live: Vec<_> = registry.live_at(now).map(|e| e.id.as_str()).collect();
        assert_eq!(live, vec!["late"]);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.prune_expired(now), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.prune_expired(now), 0);
    }
}
