//! ReportLifecycleEngine - the single writer of report state.
//!
//! Every report sits behind its own async mutex. An operation locks exactly
//! one report, applies at most one transition, publishes the resulting
//! notifications while still holding the lock and returns a snapshot. This
//! keeps all operations on one report linearizable and makes the
//! notification order of a report match its transition order. Operations on
//! different reports never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::escalation::EscalationPolicy;
use crate::fanout::NotificationFanout;
use crate::types::{
    LifecycleStats, MasterVoteDecision, MasterVoteStatus, NotificationKind, Priority, Report,
    ReportFilter, ReportId, ReportInput, ReportStatus, VoteCount, VoteDirection,
};

/// Engine-private state of one report.
struct ReportEntry {
    report: Report,
    /// Current vote of each identified voter
    ballots: HashMap<String, VoteDirection>,
}

/// Owns every report and enforces the lifecycle state machine.
pub struct ReportLifecycleEngine {
    policy: EscalationPolicy,
    reports: DashMap<ReportId, Arc<Mutex<ReportEntry>>>,
    fanout: NotificationFanout,
}

impl ReportLifecycleEngine {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    /// Create with custom configuration and a private fan-out.
    pub fn with_config(config: LifecycleConfig) -> Self {
        Self::with_fanout(config, NotificationFanout::new())
    }

    /// Create with custom configuration publishing into `fanout`.
    pub fn with_fanout(config: LifecycleConfig, fanout: NotificationFanout) -> Self {
        let policy = EscalationPolicy::with_config(&config.escalation);
        Self {
            policy,
            reports: DashMap::new(),
            fanout,
        }
    }

    /// Fan-out that receives this engine's notifications.
    pub fn fanout(&self) -> &NotificationFanout {
        &self.fanout
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Create a new `Open` report and announce it.
    pub async fn submit_report(&self, input: ReportInput) -> Result<Report> {
        require("title", &input.title)?;
        require("description", &input.description)?;
        require("location", &input.location)?;

        let mut input = input;
        input.submitted_by = non_blank(input.submitted_by);

        let report = Report::from_input(input);
        let id = report.id;
        let entry = Arc::new(Mutex::new(ReportEntry {
            report,
            ballots: HashMap::new(),
        }));

        // Hold the report lock until the creation notice is out so that no
        // later notification for this report can overtake it.
        let guard = entry.lock().await;
        self.reports.insert(id, entry.clone());

        info!(
            report_id = %id,
            title = %guard.report.title,
            location = %guard.report.location,
            priority = ?guard.report.priority,
            "Report submitted"
        );

        self.fanout
            .publish(NotificationKind::AppReportCreated, (&guard.report).into());

        Ok(guard.report.clone())
    }

    /// Add one anonymous vote.
    pub async fn cast_vote(&self, id: ReportId, direction: VoteDirection) -> Result<Report> {
        self.with_entry(id, |entry| {
            ensure_mutable(&entry.report)?;

            let before = entry.report.votes;
            entry.report.votes.increment(direction);
            entry.report.touch();

            debug!(
                report_id = %id,
                direction = ?direction,
                up = entry.report.votes.up,
                down = entry.report.votes.down,
                "Vote cast"
            );

            self.after_vote(&mut entry.report, before);
            Ok(entry.report.clone())
        })
        .await
    }

    /// Cast, switch or retract the vote of an identified voter.
    ///
    /// Voting the same direction again retracts the ballot; voting the other
    /// direction moves it.
    pub async fn cast_ballot(
        &self,
        id: ReportId,
        voter: &str,
        direction: VoteDirection,
    ) -> Result<Report> {
        let voter = voter.trim();
        if voter.is_empty() {
            return Err(LifecycleError::validation("voter", "must not be blank"));
        }

        self.with_entry(id, |entry| {
            ensure_mutable(&entry.report)?;

            let before = entry.report.votes;
            let votes = &mut entry.report.votes;

            match entry.ballots.get(voter).copied() {
                Some(current) if current == direction => {
                    if !votes.decrement(direction) {
                        warn!(report_id = %id, voter = %voter, "Ballot without matching tally");
                    }
                    entry.ballots.remove(voter);
                }
                Some(current) => {
                    if !votes.decrement(current) {
                        warn!(report_id = %id, voter = %voter, "Ballot without matching tally");
                    }
                    votes.increment(direction);
                    entry.ballots.insert(voter.to_string(), direction);
                }
                None => {
                    votes.increment(direction);
                    entry.ballots.insert(voter.to_string(), direction);
                }
            }
            entry.report.touch();

            debug!(
                report_id = %id,
                voter = %voter,
                ballot = ?entry.ballots.get(voter),
                up = entry.report.votes.up,
                down = entry.report.votes.down,
                "Ballot updated"
            );

            self.after_vote(&mut entry.report, before);
            Ok(entry.report.clone())
        })
        .await
    }

    /// Record the Master Vote. Fails with `AlreadyDecided` once recorded.
    pub async fn decide_master_vote(
        &self,
        id: ReportId,
        decision: MasterVoteDecision,
        moderator: &str,
    ) -> Result<Report> {
        self.with_entry(id, |entry| {
            let report = &mut entry.report;

            if report.master_vote.is_decided() {
                return Err(LifecycleError::AlreadyDecided {
                    id,
                    decision: report.master_vote,
                });
            }
            ensure_mutable(report)?;

            let now = Utc::now();
            report.master_vote = MasterVoteStatus::from(decision);
            report.master_vote_by = Some(match moderator.trim() {
                "" => "admin".to_string(),
                name => name.to_string(),
            });
            report.master_vote_at = Some(now);

            let previous = report.status;
            match decision {
                MasterVoteDecision::Approved if report.status == ReportStatus::Open => {
                    report.status = ReportStatus::Voting;
                }
                MasterVoteDecision::Approved => {}
                MasterVoteDecision::Rejected => report.status = ReportStatus::Rejected,
            }
            report.updated_at = now;

            info!(
                report_id = %id,
                decision = %report.master_vote,
                moderator = ?report.master_vote_by,
                from = %previous,
                to = %report.status,
                "Master Vote recorded"
            );

            self.fanout
                .publish(NotificationKind::MasterVoteDecided, (&*report).into());
            Ok(report.clone())
        })
        .await
    }

    /// Move a report to `Completed`. Terminal reports are returned unchanged.
    pub async fn mark_concluded(&self, id: ReportId) -> Result<Report> {
        self.with_entry(id, |entry| {
            if entry.report.is_terminal() {
                debug!(report_id = %id, status = %entry.report.status, "Already concluded");
                return Ok(entry.report.clone());
            }
            self.conclude(&mut entry.report);
            Ok(entry.report.clone())
        })
        .await
    }

    /// Administrative status change along the state machine.
    pub async fn update_status(&self, id: ReportId, status: ReportStatus) -> Result<Report> {
        self.with_entry(id, |entry| {
            let report = &mut entry.report;
            ensure_mutable(report)?;

            if report.status == status {
                return Ok(report.clone());
            }

            let invalid = LifecycleError::InvalidTransition {
                id,
                from: report.status,
                to: status,
            };
            match status {
                ReportStatus::Completed => self.conclude(report),
                // Only the Master Vote may reject.
                ReportStatus::Rejected => return Err(invalid),
                _ if !report.status.can_transition_to(status) => return Err(invalid),
                _ => {
                    info!(report_id = %id, from = %report.status, to = %status, "Status updated");
                    report.status = status;
                    report.touch();
                }
            }
            Ok(report.clone())
        })
        .await
    }

    /// A citizen takes the lead on a community report: `Voting` moves to
    /// `InProgress` with `initiator` recorded, and admins are alerted.
    pub async fn take_initiative(&self, id: ReportId, initiator: &str) -> Result<Report> {
        let initiator = initiator.trim();
        if initiator.is_empty() {
            return Err(LifecycleError::validation("initiator", "must not be blank"));
        }

        self.with_entry(id, |entry| {
            let report = &mut entry.report;
            ensure_mutable(report)?;

            if !report.community_threshold_crossed {
                return Err(LifecycleError::NotCommunityBacked(id));
            }
            if report.status != ReportStatus::Voting {
                return Err(LifecycleError::InvalidTransition {
                    id,
                    from: report.status,
                    to: ReportStatus::InProgress,
                });
            }

            report.status = ReportStatus::InProgress;
            report.initiator = Some(initiator.to_string());
            report.touch();

            info!(report_id = %id, initiator = %initiator, "Initiative taken");

            self.fanout
                .publish(NotificationKind::InitiativeTaken, (&*report).into());
            Ok(report.clone())
        })
        .await
    }

    pub async fn update_priority(&self, id: ReportId, priority: Priority) -> Result<Report> {
        self.with_entry(id, |entry| {
            ensure_mutable(&entry.report)?;
            entry.report.priority = priority;
            entry.report.touch();
            info!(report_id = %id, priority = ?priority, "Priority updated");
            Ok(entry.report.clone())
        })
        .await
    }

    /// Assign a team, or clear the assignment with `None` or a blank name.
    pub async fn assign_to(&self, id: ReportId, assignee: Option<String>) -> Result<Report> {
        let assignee = non_blank(assignee);
        self.with_entry(id, |entry| {
            ensure_mutable(&entry.report)?;
            info!(report_id = %id, assignee = ?assignee, "Assignment updated");
            entry.report.assigned_to = assignee;
            entry.report.touch();
            Ok(entry.report.clone())
        })
        .await
    }

    /// Set the completion percentage (0 - 100).
    pub async fn update_progress(&self, id: ReportId, percent: u8) -> Result<Report> {
        if percent > 100 {
            return Err(LifecycleError::validation(
                "completion_rate",
                format!("{percent} is above 100"),
            ));
        }
        self.with_entry(id, |entry| {
            ensure_mutable(&entry.report)?;
            entry.report.completion_rate = percent;
            entry.report.touch();
            debug!(report_id = %id, completion_rate = percent, "Progress updated");
            Ok(entry.report.clone())
        })
        .await
    }

    /// Snapshot of one report.
    pub async fn get(&self, id: ReportId) -> Result<Report> {
        self.with_entry(id, |entry| Ok(entry.report.clone())).await
    }

    /// Reports matching `filter`, newest first.
    pub async fn list(&self, filter: &ReportFilter) -> Vec<Report> {
        let mut reports = Vec::new();
        for entry in self.entries() {
            let guard = entry.lock().await;
            if filter.matches(&guard.report) {
                reports.push(guard.report.clone());
            }
        }
        reports.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        reports
    }

    pub async fn stats(&self) -> LifecycleStats {
        let mut stats = LifecycleStats::default();
        for entry in self.entries() {
            stats.record(&entry.lock().await.report);
        }
        stats
    }

    /// Clone the entry handles out so no map shard stays locked across an await.
    fn entries(&self) -> Vec<Arc<Mutex<ReportEntry>>> {
        self.reports.iter().map(|e| e.value().clone()).collect()
    }

    async fn with_entry<T>(
        &self,
        id: ReportId,
        f: impl FnOnce(&mut ReportEntry) -> Result<T>,
    ) -> Result<T> {
        let entry = self
            .reports
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(LifecycleError::NotFound(id))?;

        let mut guard = entry.lock().await;
        f(&mut *guard)
    }

    /// Apply the community escalation after a tally change.
    fn after_vote(&self, report: &mut Report, before: VoteCount) {
        if report.community_threshold_crossed {
            return;
        }
        if !self.policy.evaluate(before, report.votes).crossed() {
            return;
        }

        report.community_threshold_crossed = true;
        if report.status == ReportStatus::Open {
            report.status = ReportStatus::Voting;
        }

        info!(
            report_id = %report.id,
            up = report.votes.up,
            threshold = self.policy.threshold(),
            status = %report.status,
            "Report reached community status"
        );

        self.fanout
            .publish(NotificationKind::CommunityThresholdReached, (&*report).into());
    }

    fn conclude(&self, report: &mut Report) {
        let previous = report.status;
        report.status = ReportStatus::Completed;
        report.completion_rate = 100;
        report.touch();

        info!(report_id = %report.id, from = %previous, "Report concluded");

        self.fanout
            .publish(NotificationKind::ReportConcluded, (&*report).into());
    }
}

impl Default for ReportLifecycleEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LifecycleError::validation(field, "is required"));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn ensure_mutable(report: &Report) -> Result<()> {
    if report.is_terminal() {
        return Err(LifecycleError::TerminalState {
            id: report.id,
            status: report.status,
        });
    }
    Ok(())
}
