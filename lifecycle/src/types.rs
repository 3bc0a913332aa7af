//! Core types for the report lifecycle.
//!
//! These types model a citizen-submitted civic report, its vote tally, the
//! one-time Master Vote decision and the notifications emitted when a report
//! changes state.
//!
//! With the `typescript` feature enabled, these types can be exported to TypeScript
//! using ts-rs for consistency with the web frontend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Opaque report identifier, assigned at submission and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct ReportId(Uuid);

impl ReportId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ReportId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Lifecycle status of a report.
///
/// `Completed` and `Rejected` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Submitted, awaiting community support or a Master Vote
    Open,
    /// Approved for community voting
    Voting,
    /// Work has started
    InProgress,
    /// Concluded
    Completed,
    /// Rejected by the Master Vote
    Rejected,
}

impl ReportStatus {
    /// Whether no further transition may occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        match (*self, next) {
            (Completed | Rejected, _) => false,
            (Open, Voting) => true,
            (Open | Voting | InProgress, Rejected) => true,
            (Open | Voting | InProgress, Completed) => true,
            (Voting, InProgress) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Voting => "voting",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report priority. Informational only; never gates a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Kind of civic issue being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pothole,
    Streetlight,
    Water,
    Waste,
    Traffic,
    Park,
    Other,
}

impl Default for Category {
    fn default() -> Self {
        Self::Other
    }
}

/// State of the one-time administrative Master Vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum MasterVoteStatus {
    Pending,
    Approved,
    Rejected,
}

impl MasterVoteStatus {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for MasterVoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A Master Vote decision as issued by a moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum MasterVoteDecision {
    Approved,
    Rejected,
}

impl From<MasterVoteDecision> for MasterVoteStatus {
    fn from(decision: MasterVoteDecision) -> Self {
        match decision {
            MasterVoteDecision::Approved => Self::Approved,
            MasterVoteDecision::Rejected => Self::Rejected,
        }
    }
}

/// Direction of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Up,
    Down,
}

/// Up/down tally of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VoteCount {
    pub up: u32,
    pub down: u32,
}

impl VoteCount {
    pub fn new(up: u32, down: u32) -> Self {
        Self { up, down }
    }

    fn counter_mut(&mut self, direction: VoteDirection) -> &mut u32 {
        match direction {
            VoteDirection::Up => &mut self.up,
            VoteDirection::Down => &mut self.down,
        }
    }

    /// Add exactly one vote in `direction`.
    pub fn increment(&mut self, direction: VoteDirection) {
        let counter = self.counter_mut(direction);
        *counter = counter.saturating_add(1);
    }

    /// Remove exactly one vote in `direction`.
    ///
    /// Returns `false` and leaves the tally untouched if the counter is zero.
    pub fn decrement(&mut self, direction: VoteDirection) -> bool {
        let counter = self.counter_mut(direction);
        if *counter == 0 {
            return false;
        }
        *counter -= 1;
        true
    }
}

/// A civic report as tracked by the lifecycle engine.
///
/// Values handed out by the engine are snapshots; mutating one has no effect
/// on the engine's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Report {
    pub id: ReportId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: Category,
    pub status: ReportStatus,
    pub priority: Priority,
    pub votes: VoteCount,
    pub master_vote: MasterVoteStatus,
    /// Moderator who recorded the Master Vote
    pub master_vote_by: Option<String>,
    /// When the Master Vote was recorded
    pub master_vote_at: Option<DateTime<Utc>>,
    /// Percent of work done (0 - 100)
    pub completion_rate: u8,
    /// Sticky: set the first time up-votes reach the community threshold
    pub community_threshold_crossed: bool,
    pub submitted_by: Option<String>,
    pub assigned_to: Option<String>,
    /// Citizen leading the work on a community report
    pub initiator: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub(crate) fn from_input(input: ReportInput) -> Self {
        let now = Utc::now();
        Self {
            id: ReportId::new(),
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            location: input.location.trim().to_string(),
            category: input.category,
            status: ReportStatus::Open,
            priority: input.priority,
            votes: VoteCount::default(),
            master_vote: MasterVoteStatus::Pending,
            master_vote_by: None,
            master_vote_at: None,
            completion_rate: 0,
            community_threshold_crossed: false,
            submitted_by: input.submitted_by,
            assigned_to: None,
            initiator: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields supplied by a citizen when submitting a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ReportInput {
    pub title: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

impl ReportInput {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn submitted_by(mut self, name: impl Into<String>) -> Self {
        self.submitted_by = Some(name.into());
        self
    }
}

/// Admin dashboard filter. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub status: Option<ReportStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// `true` for community-backed reports, `false` for those still pending
    #[serde(default)]
    pub community: Option<bool>,
    /// Case-insensitive substring of the title
    #[serde(default, rename = "q")]
    pub search: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        if let Some(status) = self.status {
            if report.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if report.priority != priority {
                return false;
            }
        }
        if let Some(community) = self.community {
            if report.community_threshold_crossed != community {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => report.title.to_lowercase().contains(&q.to_lowercase()),
            _ => true,
        }
    }
}

/// Aggregate counts for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct LifecycleStats {
    pub total: usize,
    pub open: usize,
    pub voting: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub rejected: usize,
    /// Reports that ever reached community status
    pub community: usize,
    /// Reports still waiting for a Master Vote
    pub awaiting_master_vote: usize,
}

impl LifecycleStats {
    pub(crate) fn record(&mut self, report: &Report) {
        self.total += 1;
        match report.status {
            ReportStatus::Open => self.open += 1,
            ReportStatus::Voting => self.voting += 1,
            ReportStatus::InProgress => self.in_progress += 1,
            ReportStatus::Completed => self.completed += 1,
            ReportStatus::Rejected => self.rejected += 1,
        }
        if report.community_threshold_crossed {
            self.community += 1;
        }
        if !report.master_vote.is_decided() {
            self.awaiting_master_vote += 1;
        }
    }
}

/// Kind of lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A new report was submitted
    AppReportCreated,
    /// Up-votes reached the community threshold
    CommunityThresholdReached,
    /// A report was marked completed
    ReportConcluded,
    /// The Master Vote was recorded
    MasterVoteDecided,
    /// A citizen took the lead on a community report; alerts admins
    InitiativeTaken,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppReportCreated => "app_report_created",
            Self::CommunityThresholdReached => "community_threshold_reached",
            Self::ReportConcluded => "report_concluded",
            Self::MasterVoteDecided => "master_vote_decided",
            Self::InitiativeTaken => "initiative_taken",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalized copy of the report fields a display surface needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct NotificationPayload {
    pub report_id: ReportId,
    pub title: String,
    pub location: String,
    pub status: ReportStatus,
    pub priority: Priority,
    pub votes: VoteCount,
    pub master_vote: MasterVoteStatus,
    pub initiator: Option<String>,
}

impl From<&Report> for NotificationPayload {
    fn from(report: &Report) -> Self {
        Self {
            report_id: report.id,
            title: report.title.clone(),
            location: report.location.clone(),
            status: report.status,
            priority: report.priority,
            votes: report.votes,
            master_vote: report.master_vote,
            initiator: report.initiator.clone(),
        }
    }
}

/// An immutable, timestamped fan-out record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Notification {
    pub id: Uuid,
    /// Publish order within one fan-out, starting at 1
    pub sequence: u64,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn report_id(&self) -> ReportId {
        self.payload.report_id
    }
}
