//! Weighted composite scoring.

use commute_risk_risk_models::{MAX_SCORE, RiskBreakdown, RiskClass};
use serde::{Deserialize, Serialize};

use crate::RiskError;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Relative weight of each sub-score in the composite.
///
/// Weights must be finite and non-negative and must sum to 1, which keeps
/// the composite within 0-100 and monotonic in every sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub weather: f64,
    pub traffic: f64,
    pub event: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            weather: 0.40,
            traffic: 0.35,
            event: 0.25,
        }
    }
}

impl RiskWeights {
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidWeights`] if any weight is negative or
    /// not finite, or if the weights do not sum to 1.
    pub fn validate(&self) -> Result<(), RiskError> {
        let weights = [self.weather, self.traffic, self.event];
        let valid = weights.iter().all(|w| w.is_finite() && *w >= 0.0)
            && (weights.iter().sum::<f64>() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE;

        if valid {
            Ok(())
        } else {
            Err(RiskError::InvalidWeights {
                weather: self.weather,
                traffic: self.traffic,
                event: self.event,
            })
        }
    }
}

/// Combines sub-scores into a composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidWeights`] if `weights` fail validation.
    pub fn new(weights: RiskWeights) -> Result<Self, RiskError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    #[must_use]
    pub const fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    /// Computes the composite score for `breakdown`, rounded half away
    /// from zero.
    ///
    /// The result depends only on `breakdown`; no previous score is
    /// consulted.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidInput`] naming the first sub-score that is
    /// outside `0..=100` or not finite.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn score(&self, breakdown: &RiskBreakdown) -> Result<u8, RiskError> {
        for (component, value) in breakdown.components() {
            if !(0.0..=f64::from(MAX_SCORE)).contains(&value) {
                return Err(RiskError::InvalidInput { component, value });
            }
        }

        let weighted = self.weights.event.mul_add(
            breakdown.event_score,
            self.weights.traffic.mul_add(
                breakdown.traffic_score,
                self.weights.weather * breakdown.weather_score,
            ),
        );

        Ok(weighted.round().clamp(0.0, f64::from(MAX_SCORE)) as u8)
    }

    /// Scores and classifies `breakdown`.
    ///
    /// # Errors
    ///
    /// See [`RiskScorer::score`].
    pub fn assess(&self, breakdown: &RiskBreakdown) -> Result<(u8, RiskClass), RiskError> {
        let score = self.score(breakdown)?;
        Ok((score, classify(score)))
    }
}

/// Maps a composite score to its risk band.
#[must_use]
pub const fn classify(score: u8) -> RiskClass {
    RiskClass::from_score(score)
}

#[cfg(test)]
mod tests {
    use commute_risk_risk_models::RiskComponent;

    use super::*;

    fn uniform(value: f64) -> RiskBreakdown {
        RiskBreakdown::new(value, value, value)
    }

    #[test]
    fn uniform_breakdown_scores_its_value() {
        let scorer = RiskScorer::default();
        for value in [0, 12, 33, 34, 50, 66, 67, 99, 100] {
            assert_eq!(scorer.score(&uniform(f64::from(value))).unwrap(), value);
        }
    }

    #[test]
    fn classification_boundaries_through_scorer() {
        let scorer = RiskScorer::default();
        let cases = [
            (33.0, RiskClass::Low),
            (34.0, RiskClass::Medium),
            (66.0, RiskClass::Medium),
            (67.0, RiskClass::High),
        ];
        for (value, expected) in cases {
            assert_eq!(scorer.assess(&uniform(value)).unwrap().1, expected);
        }
    }

    #[test]
    fn default_weights_favour_weather() {
        let scorer = RiskScorer::default();
        assert_eq!(scorer.score(&RiskBreakdown::new(100.0, 0.0, 0.0)).unwrap(), 40);
        assert_eq!(scorer.score(&RiskBreakdown::new(0.0, 100.0, 0.0)).unwrap(), 35);
        assert_eq!(scorer.score(&RiskBreakdown::new(0.0, 0.0, 100.0)).unwrap(), 25);
    }

    #[test]
    fn monotonic_in_each_sub_score() {
        let scorer = RiskScorer::default();
        let base = RiskBreakdown::new(20.0, 45.0, 70.0);
        let base_score = scorer.score(&base).unwrap();

        for bump in [1.0, 5.0, 25.0] {
            let mut higher = base;
            higher.weather_score += bump;
            assert!(scorer.score(&higher).unwrap() >= base_score);

            let mut higher = base;
            higher.traffic_score += bump;
            assert!(scorer.score(&higher).unwrap() >= base_score);

            let mut higher = base;
            higher.event_score += bump;
            assert!(scorer.score(&higher).unwrap() >= base_score);
        }
    }

    #[test]
    fn rejects_out_of_range_sub_scores_without_clamping() {
        let scorer = RiskScorer::default();
        assert_eq!(
            scorer.score(&RiskBreakdown::new(10.0, 101.0, 0.0)),
            Err(RiskError::InvalidInput {
                component: RiskComponent::Traffic,
                value: 101.0,
            })
        );
        assert!(scorer.score(&RiskBreakdown::new(-0.5, 0.0, 0.0)).is_err());
        assert!(scorer.score(&RiskBreakdown::new(f64::NAN, 0.0, 0.0)).is_err());
    }

    #[test]
    fn validates_weights() {
        assert!(RiskScorer::new(RiskWeights::default()).is_ok());
        assert!(
            RiskScorer::new(RiskWeights {
                weather: 0.5,
                traffic: 0.5,
                event: 0.5,
            })
            .is_err()
        );
        assert!(
            RiskScorer::new(RiskWeights {
                weather: 1.2,
                traffic: -0.2,
                event: 0.0,
            })
            .is_err()
        );
        let custom = RiskScorer::new(RiskWeights {
            weather: 0.0,
            traffic: 0.0,
            event: 1.0,
        })
        .unwrap();
        assert_eq!(custom.score(&RiskBreakdown::new(90.0, 90.0, 12.0)).unwrap(), 12);
    }
}
