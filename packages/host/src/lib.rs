#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation host.
//!
//! Drives one cycle at a time: ingest hazard events into the live
//! registry, evaluate every active route (geometry, nearby hazards, risk
//! score, departure forecast), turn the results into notification
//! decisions, and hand those decisions to a [`Notifier`]. Per-route
//! failures are recorded in the [`CycleReport`] and never abort the
//! cycle.

pub mod config;
pub mod input;
pub mod notifier;
pub mod pipeline;
pub mod preview;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use commute_risk_geo_models::InvalidCoordinate;
use commute_risk_hazard::{HazardError, HazardRegistry};
use commute_risk_hazard_models::HazardEvent;
use commute_risk_notify::{NotificationScheduler, SchedulerError, SchedulingStore};
use commute_risk_notify_models::{DepartureAlert, ScheduleDecision};
use commute_risk_polyline::{DecodeError, GeometryError};
use commute_risk_risk::{RiskError, RiskScorer, SnapshotTracker};
use commute_risk_risk_models::RiskSnapshot;
use commute_risk_route_models::{Route, RouteError};
use serde::Serialize;
use uuid::Uuid;

pub use config::HostConfig;
pub use input::{BatchInput, UserSettings};
pub use notifier::{LogNotifier, Notifier, NotifierError};
pub use pipeline::RouteEvaluation;

/// Errors that abort a whole cycle or a CLI command.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid batch input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl HostError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Scheduler(e) => e.is_retryable(),
            Self::Toml(_)
            | Self::Json(_)
            | Self::InvalidConfig(_)
            | Self::Risk(_)
            | Self::Decode(_)
            | Self::Geometry(_) => false,
        }
    }
}

/// Errors from evaluating a single route.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Hazard(#[from] HazardError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Coordinate(#[from] InvalidCoordinate),

    /// The worker evaluating the route panicked or was cancelled.
    #[error("route {0}: evaluation worker failed")]
    Worker(String),
}

impl PipelineError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Hazard(e) => e.is_retryable(),
            Self::Risk(e) => e.is_retryable(),
            Self::Decode(_)
            | Self::Geometry(_)
            | Self::Route(_)
            | Self::Coordinate(_)
            | Self::Worker(_) => false,
        }
    }
}

/// Where in the cycle a route failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Prepare,
    Evaluate,
    Snapshot,
    Schedule,
    Sweep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFailure {
    pub route_id: String,
    pub stage: FailureStage,
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub alert_id: Uuid,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of one aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub now: DateTime<Utc>,
    /// Ids of incoming events that failed validation.
    pub rejected_events: Vec<String>,
    pub pruned_events: usize,
    pub live_events: usize,
    pub snapshots: Vec<RiskSnapshot>,
    pub evaluations: Vec<RouteEvaluation>,
    /// Every decision other than "unchanged", after delivery.
    pub decisions: Vec<ScheduleDecision>,
    /// One-time alerts that came due this cycle.
    pub one_time_alerts: Vec<DepartureAlert>,
    pub route_failures: Vec<RouteFailure>,
    pub delivery_failures: Vec<DeliveryFailure>,
}

impl CycleReport {
    const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            rejected_events: Vec::new(),
            pruned_events: 0,
            live_events: 0,
            snapshots: Vec::new(),
            evaluations: Vec::new(),
            decisions: Vec::new(),
            one_time_alerts: Vec::new(),
            route_failures: Vec::new(),
            delivery_failures: Vec::new(),
        }
    }

    fn route_failed(
        &mut self,
        route_id: &str,
        stage: FailureStage,
        error: &dyn std::error::Error,
        retryable: bool,
    ) {
        log::warn!("route {route_id}: {stage:?} failed: {error}");
        self.route_failures.push(RouteFailure {
            route_id: route_id.to_string(),
            stage,
            error: error.to_string(),
            retryable,
        });
    }

    fn delivery_failed(&mut self, alert_id: Uuid, error: &NotifierError) {
        log::warn!("alert {alert_id}: delivery failed: {error}");
        self.delivery_failures.push(DeliveryFailure {
            alert_id,
            error: error.to_string(),
            retryable: error.is_retryable(),
        });
    }
}

/// Long-lived host state carried between cycles.
pub struct Host<S, N> {
    config: Arc<HostConfig>,
    scorer: RiskScorer,
    scheduler: NotificationScheduler<S>,
    registry: HazardRegistry,
    tracker: SnapshotTracker,
    notifier: N,
}

impl<S: SchedulingStore, N: Notifier> Host<S, N> {
    /// # Errors
    ///
    /// * [`HostError::InvalidConfig`] or [`HostError::Risk`] if `config`
    ///   fails validation
    pub fn new(config: HostConfig, store: S, notifier: N) -> Result<Self, HostError> {
        config.validate()?;
        let scorer = RiskScorer::new(config.weights)?;
        let scheduler = NotificationScheduler::new(store, config.scheduler_config());

        Ok(Self {
            config: Arc::new(config),
            scorer,
            scheduler,
            registry: HazardRegistry::new(),
            tracker: SnapshotTracker::new(),
            notifier,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    #[must_use]
    pub const fn scheduler(&self) -> &NotificationScheduler<S> {
        &self.scheduler
    }

    #[must_use]
    pub const fn registry(&self) -> &HazardRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Runs one aggregation cycle over `batch` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Scheduler`] if the scheduling store cannot be
    /// listed or one-time alerts cannot be stored. Failures scoped to a
    /// single route or alert are recorded in the report instead.
    pub async fn run_cycle(
        &mut self,
        batch: BatchInput,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, HostError> {
        let BatchInput {
            routes,
            user_settings,
            events,
            forecasts,
            previous_scores,
            invalidated_routes,
            one_time_alerts,
        } = batch;
        let mut report = CycleReport::new(now);

        for event in events {
            let id = event.id.clone();
            if let Err(e) = self.registry.upsert(event) {
                log::warn!("rejecting hazard event {id}: {e}");
                report.rejected_events.push(id);
            }
        }
        report.pruned_events = self.registry.prune_expired(now);
        let live: Arc<[HazardEvent]> = self.registry.live_at(now).cloned().collect();
        report.live_events = live.len();

        for (route_id, score) in previous_scores {
            if self.tracker.previous(&route_id).is_none() {
                self.tracker.seed(route_id, score);
            }
        }

        // Every known route takes part in the sweep, even one whose
        // geometry failed, so its stored state is not treated as deleted.
        let mut known_routes = Vec::with_capacity(routes.len());
        let mut active = Vec::new();
        for mut record in routes {
            if let Some(settings) = user_settings.get(&record.user_id) {
                settings.apply_to(&mut record);
            }
            match pipeline::prepare_route(record.clone(), &self.config) {
                Ok(route) => {
                    if route.is_active {
                        active.push(route.clone());
                    }
                    known_routes.push(route);
                }
                Err(e) => {
                    report.route_failed(&record.id, FailureStage::Prepare, &e, e.is_retryable());
                    known_routes.push(record.into_route(Vec::new()));
                }
            }
        }
        let known_ids: BTreeSet<String> = known_routes.iter().map(|r| r.id.clone()).collect();

        for route_id in invalidated_routes {
            if let Err(e) = self.scheduler.invalidate(&route_id).await {
                report.route_failed(&route_id, FailureStage::Schedule, &e, e.is_retryable());
            }
        }

        let mut evaluations = pipeline::evaluate_routes(
            &active,
            live,
            &forecasts,
            self.scorer,
            Arc::clone(&self.config),
            now,
        )
        .await;

        for route in active {
            self.schedule_route(route, &mut evaluations, now, &mut report)
                .await;
        }

        for (route_id, result) in self.scheduler.sweep(&known_routes, now).await? {
            match result {
                Ok(decision) => self.dispatch(decision, &mut report).await,
                Err(e) => report.route_failed(&route_id, FailureStage::Sweep, &e, e.is_retryable()),
            }
        }
        let forgotten = self.tracker.retain(|id| known_ids.contains(id));
        if forgotten > 0 {
            log::debug!("dropped score history for {forgotten} deleted routes");
        }

        for request in one_time_alerts {
            self.scheduler
                .set_one_time(&request.user_id, &request.title, &request.body, request.trigger)
                .await?;
        }
        for mut alert in self.scheduler.take_due_one_time(now).await? {
            match self.notifier.deliver(&alert).await {
                Ok(()) => alert.delivered = true,
                Err(e) => {
                    report.delivery_failed(alert.id, &e);
                    if e.is_retryable() {
                        self.scheduler.restore_one_time(alert.clone()).await?;
                    }
                }
            }
            report.one_time_alerts.push(alert);
        }

        log::info!(
            "cycle at {now}: {} live events, {} routes scored, {} decisions, {} route failures",
            report.live_events,
            report.snapshots.len(),
            report.decisions.len(),
            report.route_failures.len()
        );

        Ok(report)
    }

    async fn schedule_route(
        &mut self,
        mut route: Route,
        evaluations: &mut BTreeMap<String, Result<RouteEvaluation, PipelineError>>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let evaluation = match evaluations.remove(&route.id) {
            Some(Ok(evaluation)) => evaluation,
            Some(Err(e)) => {
                report.route_failed(&route.id, FailureStage::Evaluate, &e, e.is_retryable());
                return;
            }
            None => return,
        };

        match self
            .tracker
            .record(&self.scorer, &route.id, evaluation.current, now)
        {
            Ok(snapshot) => report.snapshots.push(snapshot),
            Err(e) => {
                report.route_failed(&route.id, FailureStage::Snapshot, &e, e.is_retryable());
                return;
            }
        }

        route.optimal_time = Some(evaluation.recommendation.optimal_time);
        match self
            .scheduler
            .apply(&route, &evaluation.recommendation, now)
            .await
        {
            Ok(decision) => self.dispatch(decision, report).await,
            Err(e) => report.route_failed(&route.id, FailureStage::Schedule, &e, e.is_retryable()),
        }

        report.evaluations.push(evaluation);
    }

    /// Hands `decision` to the notifier. Delivery failures are recorded,
    /// not propagated. A transient failure releases the decision's state
    /// so the next cycle decides again.
    async fn dispatch(&self, mut decision: ScheduleDecision, report: &mut CycleReport) {
        let result = match &mut decision {
            ScheduleDecision::Fire { alert, cancels } => {
                if let Some(old) = *cancels
                    && let Err(e) = self.notifier.cancel(old).await
                {
                    report.delivery_failed(old, &e);
                }
                let delivered = self.notifier.deliver(alert).await;
                alert.delivered = delivered.is_ok();
                delivered.map_err(|e| (alert.id, e))
            }
            ScheduleDecision::Schedule { alert, replaces } => self
                .notifier
                .schedule(alert, *replaces)
                .await
                .map_err(|e| (alert.id, e)),
            ScheduleDecision::Cancel { alert_id, .. } => self
                .notifier
                .cancel(*alert_id)
                .await
                .map_err(|e| (*alert_id, e)),
            ScheduleDecision::Unchanged { .. } => return,
        };

        if let Err((alert_id, e)) = result {
            report.delivery_failed(alert_id, &e);
            if e.is_retryable() {
                self.release(&decision, report).await;
            }
        }
        report.decisions.push(decision);
    }

    async fn release(&self, decision: &ScheduleDecision, report: &mut CycleReport) {
        let Some(route_id) = decision.alert().and_then(|a| a.route_id.as_deref()) else {
            return;
        };
        // The old reminder is withdrawn either way.
        if let ScheduleDecision::Schedule {
            replaces: Some(old),
            ..
        } = decision
            && let Err(e) = self.notifier.cancel(*old).await
        {
            report.delivery_failed(*old, &e);
        }
        if let Err(e) = self.scheduler.release(decision).await {
            report.route_failed(route_id, FailureStage::Schedule, &e, e.is_retryable());
        }
    }
}
