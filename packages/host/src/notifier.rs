//! Alert delivery seam.
//!
//! The host never talks to a push service directly. Decisions from the
//! scheduler are handed to a [`Notifier`], which owns delivery, deferred
//! scheduling on the device side, and withdrawal.

use async_trait::async_trait;
use commute_risk_notify_models::DepartureAlert;
use uuid::Uuid;

/// Errors from a delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifierError {
    /// The transport rejected or dropped the request.
    #[error("notification transport error: {0}")]
    Transport(String),
    /// The alert was malformed for this transport.
    #[error("notification rejected: {0}")]
    Rejected(String),
}

impl NotifierError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `alert` immediately.
    async fn deliver(&self, alert: &DepartureAlert) -> Result<(), NotifierError>;

    /// Registers `alert` for delivery at its trigger time, withdrawing
    /// `replaces` first if set.
    async fn schedule(
        &self,
        alert: &DepartureAlert,
        replaces: Option<Uuid>,
    ) -> Result<(), NotifierError>;

    /// Withdraws a previously scheduled alert.
    async fn cancel(&self, alert_id: Uuid) -> Result<(), NotifierError>;
}

/// Writes every alert to the log. Used by the CLI host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, alert: &DepartureAlert) -> Result<(), NotifierError> {
        log::info!(
            "[deliver] user={} alert={} {}: {}",
            alert.user_id,
            alert.id,
            alert.title,
            alert.body
        );
        Ok(())
    }

    async fn schedule(
        &self,
        alert: &DepartureAlert,
        replaces: Option<Uuid>,
    ) -> Result<(), NotifierError> {
        let at = alert
            .trigger_at()
            .map_or_else(|| "now".to_string(), |at| at.to_rfc3339());
        match replaces {
            Some(old) => log::info!(
                "[schedule] user={} alert={} at {at} (replaces {old}) {}",
                alert.user_id,
                alert.id,
                alert.title
            ),
            None => log::info!(
                "[schedule] user={} alert={} at {at} {}",
                alert.user_id,
                alert.id,
                alert.title
            ),
        }
        Ok(())
    }

    async fn cancel(&self, alert_id: Uuid) -> Result<(), NotifierError> {
        log::info!("[cancel] alert={alert_id}");
        Ok(())
    }
}
