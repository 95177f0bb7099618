#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Departure notification scheduling.
//!
//! Turns a route's [`DepartureRecommendation`] into fire, schedule or
//! cancel decisions. Per-route state lives behind the [`SchedulingStore`]
//! trait and is only ever written through compare-and-set, so concurrent
//! scheduler ticks cannot double-fire a route.
//!
//! [`DepartureRecommendation`]: commute_risk_risk_models::DepartureRecommendation

pub mod messages;
pub mod scheduler;
pub mod store;

pub use scheduler::{NotificationScheduler, SchedulerConfig};
pub use store::{InMemorySchedulingStore, SchedulingStore};

/// Errors from the scheduling-state store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or is in a bad state.
    #[error("scheduling store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        true
    }
}

/// Errors from scheduling a route.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another tick kept winning the check-and-set for this route.
    #[error("route {route_id}: scheduling state changed concurrently {attempts} times")]
    Conflict {
        /// The contended route.
        route_id: String,
        /// How many check-and-set attempts were made.
        attempts: usize,
    },

    /// The route itself is invalid.
    #[error(transparent)]
    Route(#[from] commute_risk_route_models::RouteError),
}

impl SchedulerError {
    /// Store failures and lost races are worth retrying next cycle; invalid
    /// routes are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Conflict { .. } => true,
            Self::Route(_) => false,
        }
    }
}
