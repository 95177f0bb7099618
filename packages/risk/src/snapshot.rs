//! Per-subject snapshot history.
//!
//! Keeps exactly one cycle of history per location or route so each new
//! [`RiskSnapshot`] can carry the previous cycle's score. The previous
//! score is informational; it never feeds back into the new score.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use commute_risk_risk_models::{RiskBreakdown, RiskSnapshot};

use crate::{RiskError, RiskScorer};

#[derive(Debug, Clone, Default)]
pub struct SnapshotTracker {
    last_scores: BTreeMap<String, u8>,
}

impl SnapshotTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a score carried over from a previous process, e.g. loaded
    /// from persistence.
    pub fn seed(&mut self, subject_id: impl Into<String>, score: u8) {
        self.last_scores.insert(subject_id.into(), score);
    }

    /// Scores `breakdown` for `subject_id` and remembers the result as the
    /// subject's latest score.
    ///
    /// # Errors
    ///
    /// Returns the scorer's error if `breakdown` is invalid; the stored
    /// history is not touched in that case.
    pub fn record(
        &mut self,
        scorer: &RiskScorer,
        subject_id: &str,
        breakdown: RiskBreakdown,
        computed_at: DateTime<Utc>,
    ) -> Result<RiskSnapshot, RiskError> {
        let (score, classification) = scorer.assess(&breakdown)?;
        let previous_score = self.last_scores.insert(subject_id.to_string(), score);

        Ok(RiskSnapshot {
            subject_id: subject_id.to_string(),
            score,
            previous_score,
            classification,
            breakdown,
            computed_at,
        })
    }

    #[must_use]
    pub fn previous(&self, subject_id: &str) -> Option<u8> {
        self.last_scores.get(subject_id).copied()
    }

    /// Drops history for a deleted subject.
    pub fn forget(&mut self, subject_id: &str) -> Option<u8> {
        self.last_scores.remove(subject_id)
    }

    /// Keeps history only for subjects `keep` accepts. Returns how many
    /// were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.last_scores.len();
        self.last_scores.retain(|subject_id, _| keep(subject_id));
        before - self.last_scores.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_scores.is_empty()
    }
}
