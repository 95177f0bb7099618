//! Departure slot selection.
//!
//! Ranks a forecast of `(offset, breakdown)` points and picks the lowest
//! scoring departure slot, preferring the earliest slot on ties.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use commute_risk_risk_models::{
    DepartureRecommendation, ForecastPoint, ForecastSlot, RiskClass, RiskComponent,
};

use crate::{RiskError, RiskScorer};

/// Scores every forecast point and returns the slots sorted by offset.
///
/// # Errors
///
/// * [`RiskError::NoForecastData`] if `points` is empty
/// * [`RiskError::NegativeOffset`] / [`RiskError::DuplicateOffset`] for
///   malformed offsets
/// * [`RiskError::MissingCurrentSlot`] if no point has offset 0
/// * any scoring error for an invalid breakdown
pub fn score_forecast(
    scorer: &RiskScorer,
    points: &[ForecastPoint],
) -> Result<Vec<ForecastSlot>, RiskError> {
    if points.is_empty() {
        return Err(RiskError::NoForecastData);
    }

    let mut seen = BTreeSet::new();
    for point in points {
        if point.offset_minutes < 0 {
            return Err(RiskError::NegativeOffset(point.offset_minutes));
        }
        if !seen.insert(point.offset_minutes) {
            return Err(RiskError::DuplicateOffset(point.offset_minutes));
        }
    }
    if !seen.contains(&0) {
        return Err(RiskError::MissingCurrentSlot);
    }

    let mut slots = points
        .iter()
        .map(|point| {
            let (score, classification) = scorer.assess(&point.breakdown)?;
            Ok(ForecastSlot {
                offset_minutes: point.offset_minutes,
                score,
                classification,
                breakdown: point.breakdown,
            })
        })
        .collect::<Result<Vec<_>, RiskError>>()?;
    slots.sort_by_key(|slot| slot.offset_minutes);

    Ok(slots)
}

/// Picks the best departure slot from a forecast.
///
/// The optimal slot is the one with the minimum score, the earliest on
/// ties. Leaving now is reported as optimal when the current slot already
/// has the minimum score or is classified low; in that case the
/// recommendation points at offset 0.
///
/// # Errors
///
/// See [`score_forecast`].
pub fn optimize_departure(
    scorer: &RiskScorer,
    points: &[ForecastPoint],
    now: DateTime<Utc>,
) -> Result<DepartureRecommendation, RiskError> {
    let forecast = score_forecast(scorer, points)?;

    // Offsets are validated, sorted and include 0.
    let Some(current) = forecast.first().copied() else {
        return Err(RiskError::NoForecastData);
    };
    let mut best = current;
    for slot in &forecast[1..] {
        if slot.score < best.score {
            best = *slot;
        }
    }

    let is_optimal_now = current.score == best.score || current.classification == RiskClass::Low;
    let chosen = if is_optimal_now { current } else { best };
    let reason = explain(&current, &chosen, is_optimal_now);

    log::debug!(
        "departure forecast of {} slots: current {} ({}), optimal +{} min with {} ({})",
        forecast.len(),
        current.score,
        current.classification,
        chosen.offset_minutes,
        chosen.score,
        chosen.classification
    );

    Ok(DepartureRecommendation {
        optimal_departure_minutes: chosen.offset_minutes,
        optimal_time: now + Duration::minutes(chosen.offset_minutes),
        is_optimal_now,
        current_score: current.score,
        current_classification: current.classification,
        optimal_score: chosen.score,
        classification: chosen.classification,
        reason,
        forecast,
    })
}

/// Names the sub-score whose improvement from `current` to `optimal` is
/// largest. Ties go to the first component in breakdown order.
fn dominant_improvement(current: &ForecastSlot, optimal: &ForecastSlot) -> Option<RiskComponent> {
    let mut best: Option<(RiskComponent, f64)> = None;
    for ((component, now), (_, later)) in current
        .breakdown
        .components()
        .into_iter()
        .zip(optimal.breakdown.components())
    {
        let delta = now - later;
        if delta > 0.0 && best.is_none_or(|(_, d)| delta > d) {
            best = Some((component, delta));
        }
    }
    best.map(|(component, _)| component)
}

fn explain(current: &ForecastSlot, chosen: &ForecastSlot, is_optimal_now: bool) -> String {
    if is_optimal_now {
        return if current.classification == RiskClass::Low {
            format!("Conditions are low risk right now (score {})", current.score)
        } else {
            format!(
                "Leaving now is as good as any later time (score {})",
                current.score
            )
        };
    }

    let cause = match dominant_improvement(current, chosen) {
        Some(RiskComponent::Weather) => "weather is expected to improve",
        Some(RiskComponent::Traffic) => "traffic is expected to ease",
        Some(RiskComponent::Event) => "reported hazards are expected to clear",
        None => "overall risk is expected to drop",
    };

    format!(
        "Leave in {} minutes: {cause} (risk {} now, {} then)",
        chosen.offset_minutes, current.score, chosen.score
    )
}
