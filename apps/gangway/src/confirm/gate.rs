use crate::confirm::backend::{ConfirmStatus, ConfirmationBackend, ConfirmationTicket};
use crate::confirm::request::{ConfirmationRequest, TargetKind};
use crate::confirm::ConfirmError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Approved { processor: String },
    Rejected { processor: String },
    Cancelled,
}

impl fmt::Display for ConfirmationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationOutcome::Approved { processor } => write!(f, "approved by {processor}"),
            ConfirmationOutcome::Rejected { processor } => write!(f, "rejected by {processor}"),
            ConfirmationOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Decides whether a connection needs third-party approval and, when it does,
/// waits for a reviewer's decision.
///
/// Each gate serves exactly one [`ConfirmationRequest`]: it checks once, polls
/// at most once through to a terminal [`ConfirmationOutcome`], and keeps that
/// outcome for the rest of its life.
pub struct ConfirmationGate {
    request: ConfirmationRequest,
    backend: Arc<dyn ConfirmationBackend>,
    poll_interval: Duration,
    ticket: Option<ConfirmationTicket>,
    processor: String,
    outcome: Option<ConfirmationOutcome>,
}

impl ConfirmationGate {
    pub fn new(request: ConfirmationRequest, backend: Arc<dyn ConfirmationBackend>) -> Self {
        Self {
            request,
            backend,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ticket: None,
            processor: String::new(),
            outcome: None,
        }
    }

    /// Clamped to `1ms..=MAX_POLL_INTERVAL`.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }

    pub fn request(&self) -> &ConfirmationRequest {
        &self.request
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Asks the authorization backend whether this connection must be
    /// confirmed. A failure here means the requirement is unknown and the
    /// connection must not be granted.
    pub async fn check_required(&mut self) -> Result<bool, ConfirmError> {
        let request = &self.request;
        let system_user = request.system_user();
        match request.target_kind() {
            TargetKind::Application => self
                .backend
                .check_application(request.user_id(), request.target_id(), &system_user.id)
                .await
                .map_err(ConfirmError::BackendUnavailable),
            TargetKind::Asset => {
                let ticket = self
                    .backend
                    .check_asset(
                        request.user_id(),
                        request.target_id(),
                        &system_user.id,
                        &system_user.username,
                    )
                    .await
                    .map_err(ConfirmError::BackendUnavailable)?;
                let need_confirm = ticket.need_confirm;
                debug!(
                    target = "gangway::confirm",
                    details = %request.synopsis(),
                    need_confirm,
                    reviewers = ticket.reviewers.len(),
                    "confirmation requirement checked"
                );
                self.ticket = Some(ticket);
                Ok(need_confirm)
            }
        }
    }

    /// Polls the stored status descriptor until a reviewer approves or rejects,
    /// or `cancel` fires. Poll failures and unknown statuses are logged and
    /// retried on the next tick; they never end the wait.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> ConfirmationOutcome {
        if let Some(outcome) = &self.outcome {
            error!(
                target = "gangway::confirm",
                details = %self.request.synopsis(),
                outcome = %outcome,
                "wait called after confirmation already finished; not polling again"
            );
            return outcome.clone();
        }

        let outcome = self.poll_until_decided(cancel).await;
        info!(
            target = "gangway::confirm",
            details = %self.request.synopsis(),
            outcome = %outcome,
            "confirmation finished"
        );
        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn poll_until_decided(&mut self, cancel: &CancellationToken) -> ConfirmationOutcome {
        let period = self.poll_interval;
        let now = Instant::now();
        let first_tick = now.checked_add(period).unwrap_or(now);
        let mut ticker = time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancel_confirmation().await;
                    return ConfirmationOutcome::Cancelled;
                }
                _ = ticker.tick() => {
                    if let Some(outcome) = self.poll_once().await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn poll_once(&mut self) -> Option<ConfirmationOutcome> {
        let Some(ticket) = self.ticket.as_ref() else {
            warn!(
                target = "gangway::confirm",
                details = %self.request.synopsis(),
                "no status descriptor available; waiting for cancellation"
            );
            return None;
        };

        let response = match self.backend.status(&ticket.check_confirm_status).await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    target = "gangway::confirm",
                    error = %err,
                    "check confirm status failed"
                );
                return None;
            }
        };

        let decision = match response.kind() {
            ConfirmStatus::Approve => ConfirmationOutcome::Approved {
                processor: response.processor.clone(),
            },
            ConfirmStatus::Reject => ConfirmationOutcome::Rejected {
                processor: response.processor.clone(),
            },
            ConfirmStatus::Await => {
                debug!(target = "gangway::confirm", "confirmation still pending");
                return None;
            }
            ConfirmStatus::Unknown(status) => {
                error!(
                    target = "gangway::confirm",
                    status = %status,
                    action = %response.action,
                    "received unknown confirmation status"
                );
                return None;
            }
        };

        if response.processor.is_empty() {
            warn!(
                target = "gangway::confirm",
                status = %response.status,
                details = %self.request.synopsis(),
                "confirmation decided without a processor"
            );
        }
        self.processor = response.processor;
        Some(decision)
    }

    /// Issues the cancel descriptor once. Failure is logged, never raised.
    async fn cancel_confirmation(&self) {
        let Some(ticket) = self.ticket.as_ref() else {
            warn!(
                target = "gangway::confirm",
                details = %self.request.synopsis(),
                "no cancel descriptor available; skipping cancel request"
            );
            return;
        };
        match self.backend.cancel(&ticket.close_confirm).await {
            Ok(()) => debug!(target = "gangway::confirm", "confirmation request cancelled"),
            Err(err) => warn!(
                target = "gangway::confirm",
                error = %err,
                "cancel confirmation request failed"
            ),
        }
    }

    /// Reviewers in backend order. The returned vector is a copy.
    pub fn reviewers(&self) -> Vec<String> {
        self.ticket
            .as_ref()
            .map(|ticket| ticket.reviewers.clone())
            .unwrap_or_default()
    }

    pub fn ticket_url(&self) -> &str {
        self.ticket
            .as_ref()
            .map(|ticket| ticket.ticket_detail_url.as_str())
            .unwrap_or("")
    }

    /// The reviewer who approved or rejected; empty until then.
    pub fn processor(&self) -> &str {
        &self.processor
    }

    pub fn outcome(&self) -> Option<&ConfirmationOutcome> {
        self.outcome.as_ref()
    }
}
