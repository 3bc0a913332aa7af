//! Error types for the lifecycle engine.

use crate::types::{MasterVoteStatus, ReportId, ReportStatus};

/// Errors returned by lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Malformed or incomplete input
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Referenced report does not exist
    #[error("Report {0} not found")]
    NotFound(ReportId),

    /// Mutation attempted on a completed or rejected report
    #[error("Report {id} is {status} and can no longer change")]
    TerminalState { id: ReportId, status: ReportStatus },

    /// Master Vote was already recorded
    #[error("Master Vote for report {id} already decided: {decision}")]
    AlreadyDecided { id: ReportId, decision: MasterVoteStatus },

    /// Only community-backed reports can be taken up by a citizen
    #[error("Report {0} has not reached community status")]
    NotCommunityBacked(ReportId),

    /// The state machine has no such edge
    #[error("Report {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ReportId,
        from: ReportStatus,
        to: ReportStatus,
    },
}

impl LifecycleError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Stable tag for callers that branch on the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::TerminalState { .. } => "terminal_state",
            Self::AlreadyDecided { .. } => "already_decided",
            Self::NotCommunityBacked(_) => "not_community_backed",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Text suitable for showing to the person who triggered the action.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { field, reason } => format!("Please check the {field}: {reason}"),
            Self::NotFound(_) => "This report could not be found".to_string(),
            Self::TerminalState { .. } => "This report is closed".to_string(),
            Self::AlreadyDecided { .. } => "Decision already recorded".to_string(),
            Self::NotCommunityBacked(_) => {
                "This report needs community support first".to_string()
            }
            Self::InvalidTransition { from, to, .. } => {
                format!("A {from} report cannot be moved to {to}")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
