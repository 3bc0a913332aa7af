//! TownShip report lifecycle
//!
//! Civic reports move between states based on community votes, a one-time
//! Master Vote and administrative actions. This crate owns those rules:
//!
//! - [`engine::ReportLifecycleEngine`] - canonical report state and the
//!   lifecycle state machine
//! - [`escalation::EscalationPolicy`] - edge-triggered community threshold
//! - [`fanout::NotificationFanout`] - typed in-process publish/subscribe
//! - [`moderation::ModerationGate`] - first-decision-wins Master Vote

pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod fanout;
pub mod moderation;
pub mod types;

pub use config::{ConfigError, EscalationConfig, FanoutConfig, LifecycleConfig};
pub use engine::ReportLifecycleEngine;
pub use error::{LifecycleError, Result};
pub use escalation::{Escalation, EscalationPolicy};
pub use fanout::{
    NotificationFanout, NotificationQueue, NotificationSink, SubscriberError, Subscription,
};
pub use moderation::{GateOutcome, ModerationGate};
pub use types::*;
