//! Configuration for the lifecycle engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default up-vote count at which a report reaches community status.
pub const DEFAULT_COMMUNITY_THRESHOLD: u32 = 50;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the lifecycle engine and its fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Community escalation settings
    #[serde(default)]
    pub escalation: EscalationConfig,
    /// Notification delivery settings
    #[serde(default)]
    pub fanout: FanoutConfig,
}

impl LifecycleConfig {
    /// Create a config with a specific community threshold.
    pub fn with_threshold(community_threshold: u32) -> Self {
        Self {
            escalation: EscalationConfig {
                community_threshold,
            },
            ..Default::default()
        }
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escalation.community_threshold == 0 {
            return Err(ConfigError::Invalid(
                "community_threshold must be at least 1".to_string(),
            ));
        }
        if self.fanout.delivery_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Community escalation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Up-votes needed to reach community status
    #[serde(default = "default_community_threshold")]
    pub community_threshold: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            community_threshold: default_community_threshold(),
        }
    }
}

/// Notification fan-out configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Upper bound for one asynchronous delivery (ms)
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

impl FanoutConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

fn default_community_threshold() -> u32 { DEFAULT_COMMUNITY_THRESHOLD }
fn default_delivery_timeout_ms() -> u64 { 5_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LifecycleConfig::default();
        assert_eq!(config.escalation.community_threshold, 50);
        assert_eq!(config.fanout.delivery_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: LifecycleConfig =
            serde_json::from_str(r#"{"escalation": {"community_threshold": 7}}"#).unwrap();
        assert_eq!(parsed.escalation.community_threshold, 7);
        assert_eq!(parsed.fanout, FanoutConfig::default());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = LifecycleConfig::with_threshold(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = LifecycleConfig::default();
        config.fanout.delivery_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
