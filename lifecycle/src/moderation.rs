//! ModerationGate - first-decision-wins wrapper around the Master Vote.
//!
//! Admin dashboards call the gate instead of the engine. A duplicate or
//! racing decision is not an error for the caller: it gets the report as
//! recorded by whoever won, together with a message to show.

use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::ReportLifecycleEngine;
use crate::error::{LifecycleError, Result};
use crate::types::{MasterVoteDecision, Report, ReportId};

/// Result of a gated Master Vote.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// This call recorded the decision
    Recorded(Report),
    /// A decision existed already; the report is returned unchanged
    AlreadyRecorded(Report),
}

impl GateOutcome {
    pub fn report(&self) -> &Report {
        match self {
            Self::Recorded(report) | Self::AlreadyRecorded(report) => report,
        }
    }

    pub fn into_report(self) -> Report {
        match self {
            Self::Recorded(report) | Self::AlreadyRecorded(report) => report,
        }
    }

    pub fn was_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Recorded(_) => "Decision recorded",
            Self::AlreadyRecorded(_) => "Decision already recorded",
        }
    }
}

/// Admin-only entry point for the Master Vote.
#[derive(Clone)]
pub struct ModerationGate {
    engine: Arc<ReportLifecycleEngine>,
}

impl ModerationGate {
    pub fn new(engine: Arc<ReportLifecycleEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ReportLifecycleEngine> {
        &self.engine
    }

    /// Record `decision` unless one exists. `NotFound` and `TerminalState`
    /// still propagate.
    pub async fn decide(
        &self,
        id: ReportId,
        decision: MasterVoteDecision,
        moderator: &str,
    ) -> Result<GateOutcome> {
        match self.engine.decide_master_vote(id, decision, moderator).await {
            Ok(report) => {
                info!(report_id = %id, decision = ?decision, "Moderation decision accepted");
                Ok(GateOutcome::Recorded(report))
            }
            Err(LifecycleError::AlreadyDecided { decision: recorded, .. }) => {
                debug!(
                    report_id = %id,
                    requested = ?decision,
                    recorded = %recorded,
                    "Moderation decision ignored"
                );
                let report = self.engine.get(id).await?;
                Ok(GateOutcome::AlreadyRecorded(report))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MasterVoteStatus, NotificationKind, ReportInput, ReportStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup() -> (ModerationGate, ReportId) {
        let engine = Arc::new(ReportLifecycleEngine::new());
        let id = engine
            .submit_report(ReportInput::new("Broken pipe", "Water leaking", "Ward 4"))
            .await
            .unwrap()
            .id;
        (ModerationGate::new(engine), id)
    }

    #[tokio::test]
    async fn test_first_decision_wins() {
        let (gate, id) = setup().await;

        let first = gate
            .decide(id, MasterVoteDecision::Approved, "officer")
            .await
            .unwrap();
        assert!(first.was_recorded());
        assert_eq!(first.report().status, ReportStatus::Voting);

        let second = gate
            .decide(id, MasterVoteDecision::Rejected, "other")
            .await
            .unwrap();
        assert!(!second.was_recorded());
        assert_eq!(second.user_message(), "Decision already recorded");
        assert_eq!(second.report().master_vote, MasterVoteStatus::Approved);
        assert_eq!(second.report().master_vote_by.as_deref(), Some("officer"));
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let (gate, id) = setup().await;
        gate.engine().mark_concluded(id).await.unwrap();

        let err = gate
            .decide(id, MasterVoteDecision::Approved, "officer")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::TerminalState { .. }));

        let missing = ReportId::new();
        let err = gate
            .decide(missing, MasterVoteDecision::Approved, "officer")
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::NotFound(missing));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_decisions() {
        let (gate, id) = setup().await;
        let published = Arc::new(AtomicUsize::new(0));
        let counter = published.clone();
        gate.engine()
            .fanout()
            .subscribe(NotificationKind::MasterVoteDecided, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let approve = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.decide(id, MasterVoteDecision::Approved, "a").await })
        };
        let reject = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.decide(id, MasterVoteDecision::Rejected, "b").await })
        };

        let a = approve.await.unwrap().unwrap();
        let b = reject.await.unwrap().unwrap();

        assert_eq!(
            [a.was_recorded(), b.was_recorded()]
                .iter()
                .filter(|r| **r)
                .count(),
            1
        );
        assert_eq!(a.report().master_vote, b.report().master_vote);
        assert_eq!(published.load(Ordering::SeqCst), 1);
    }
}
