//! Community escalation policy.
//!
//! Decides when a report crosses the community-support threshold. The rule is
//! edge-triggered: a crossing is reported only on the vote that takes `up`
//! from below the threshold to at or above it, never on later evaluations.

use serde::{Deserialize, Serialize};

use crate::config::{EscalationConfig, DEFAULT_COMMUNITY_THRESHOLD};
use crate::types::VoteCount;

/// Outcome of evaluating a vote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// This change took `up` across the threshold
    CrossedThreshold,
    /// Nothing to escalate
    NoChange,
}

impl Escalation {
    pub fn crossed(&self) -> bool {
        matches!(self, Self::CrossedThreshold)
    }
}

/// `CrossedThreshold` iff `before.up < threshold <= after.up`.
pub fn evaluate(before: VoteCount, after: VoteCount, threshold: u32) -> Escalation {
    if before.up < threshold && threshold <= after.up {
        Escalation::CrossedThreshold
    } else {
        Escalation::NoChange
    }
}

/// Escalation policy bound to a configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    threshold: u32,
}

impl EscalationPolicy {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn with_config(config: &EscalationConfig) -> Self {
        Self::new(config.community_threshold)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn evaluate(&self, before: VoteCount, after: VoteCount) -> Escalation {
        evaluate(before, after, self.threshold)
    }

    /// Whether a tally is currently at or above the threshold.
    pub fn reached(&self, votes: &VoteCount) -> bool {
        votes.up >= self.threshold
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COMMUNITY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up(n: u32) -> VoteCount {
        VoteCount::new(n, 0)
    }

    #[test]
    fn test_crossing_edge() {
        assert_eq!(evaluate(up(49), up(50), 50), Escalation::CrossedThreshold);
        assert_eq!(evaluate(up(48), up(49), 50), Escalation::NoChange);
        assert_eq!(evaluate(up(50), up(51), 50), Escalation::NoChange);
    }

    #[test]
    fn test_decline_is_not_a_crossing() {
        assert_eq!(evaluate(up(50), up(49), 50), Escalation::NoChange);
    }

    #[test]
    fn test_down_votes_do_not_matter() {
        let before = VoteCount::new(49, 3);
        let after = VoteCount::new(49, 4);
        assert_eq!(evaluate(before, after, 50), Escalation::NoChange);
    }

    #[test]
    fn test_single_sweep_crosses_once() {
        let policy = EscalationPolicy::new(10);
        let crossings = (0..20)
            .filter(|n| policy.evaluate(up(*n), up(n + 1)).crossed())
            .count();
        assert_eq!(crossings, 1);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = EscalationPolicy::with_config(&EscalationConfig {
            community_threshold: 3,
        });
        assert_eq!(policy.threshold(), 3);
        assert!(policy.reached(&up(3)));
        assert!(!policy.reached(&up(2)));
        assert_eq!(EscalationPolicy::default().threshold(), 50);
    }
}
